use super::*;
use crate::ply::data::to_bytes;
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

const CUBE_ASCII: &str = "ply
format ascii 1.0
comment unit cube
element vertex 8
property float x
property float y
property float z
element face 6
property list uchar int vertex_indices
end_header
0 0 0
0 0 1
0 1 1
0 1 0
1 0 0
1 0 1
1 1 1
1 1 0
4 0 1 2 3
4 7 6 5 4
4 0 4 5 1
4 1 5 6 2
4 2 6 7 3
4 3 7 4 0
";

fn cube_file() -> Result<PlyFile> {
    let mut reader = Cursor::new(CUBE_ASCII.as_bytes());
    let mut ply = PlyFile::parse_header(&mut reader)?;
    let verts = ply.request_properties("vertex", &["x", "y", "z"], 0)?;
    let faces = ply.request_properties("face", &["vertex_indices"], 4)?;
    let mut buffers = ply.read(&mut reader)?;
    let verts = buffers.take(verts).unwrap();
    let faces = buffers.take(faces).unwrap();

    let mut out = PlyFile::new();
    out.comments_mut().push("unit cube".into());
    out.add_properties_to_element(
        "vertex",
        &["x", "y", "z"],
        verts.ty,
        verts.count,
        verts.buffer,
        PrimitiveType::Invalid,
        0,
    )?;
    out.add_list_property_to_element(
        "face",
        "vertex_indices",
        faces.ty,
        faces.buffer,
        faces.list_type,
        faces.list_lengths,
    )?;
    Ok(out)
}

#[test]
fn test_parse_and_read_cube() -> Result<()> {
    let mut reader = Cursor::new(CUBE_ASCII.as_bytes());
    let mut ply = PlyFile::parse_header(&mut reader)?;
    assert_eq!(ply.encoding(), Encoding::Ascii);
    assert!(!ply.is_binary());
    assert_eq!(ply.version(), "1.0");
    assert_eq!(ply.comments(), ["unit cube"]);
    assert!(ply.info().is_empty());
    assert_eq!(ply.elements().len(), 2);
    assert_eq!(ply.element("face").map(|e| e.count), Some(6));

    let faces = ply.request_properties("face", &["vertex_indices"], 0)?;
    let zs = ply.request_properties("vertex", &["z"], 0)?;
    let buffers = ply.read(&mut reader)?;

    let faces = buffers.get(faces).unwrap();
    assert_eq!(faces.list_lengths, vec![4; 6]);
    assert_eq!(faces.num_bytes(), 24 * 4);
    let zs = buffers.get(zs).unwrap().to_vec::<f32>()?;
    assert_eq!(zs, vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
    Ok(())
}

#[test]
fn test_requests_fail_independently() -> Result<()> {
    let mut reader = Cursor::new(CUBE_ASCII.as_bytes());
    let mut ply = PlyFile::parse_header(&mut reader)?;
    assert!(matches!(
        ply.request_properties("vertex", &["x", "nx"], 0),
        Err(Error::UnknownProperty { .. })
    ));
    assert!(matches!(
        ply.request_properties("edge", &["a"], 0),
        Err(Error::UnknownElement(_))
    ));
    let x = ply.request_properties("vertex", &["x"], 0)?;
    let buffers = ply.read(&mut reader)?;
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers.get(x).unwrap().num_values(), 8);
    Ok(())
}

#[test]
fn test_body_is_decoded_once() -> Result<()> {
    let mut reader = Cursor::new(CUBE_ASCII.as_bytes());
    let mut ply = PlyFile::parse_header(&mut reader)?;
    ply.read(&mut reader)?;
    assert!(matches!(ply.read(&mut reader), Err(Error::BodyAlreadyDecoded)));
    assert!(matches!(
        ply.request_properties("vertex", &["x"], 0),
        Err(Error::BodyAlreadyDecoded)
    ));
    Ok(())
}

#[test]
fn test_write_round_trip_every_encoding() -> Result<()> {
    let ply = cube_file()?;
    for encoding in [Encoding::Ascii, Encoding::BinaryLittleEndian, Encoding::BinaryBigEndian] {
        let mut bytes = Vec::new();
        let written = ply.write_with_encoding(&mut bytes, encoding)?;
        assert_eq!(written as usize, bytes.len());

        let mut reader = Cursor::new(bytes);
        let mut back = PlyFile::parse_header(&mut reader)?;
        assert_eq!(back.encoding(), encoding);
        assert_eq!(back.comments(), ["unit cube"]);
        assert_eq!(back.elements(), ply.elements());

        let verts = back.request_properties("vertex", &["x", "y", "z"], 0)?;
        let faces = back.request_properties("face", &["vertex_indices"], 0)?;
        let buffers = back.read(&mut reader)?;
        assert_eq!(buffers.get(verts).unwrap().buffer, ply.sources[0].bytes());
        assert_eq!(buffers.get(faces).unwrap().buffer, ply.sources[1].bytes());
        assert_eq!(buffers.get(faces).unwrap().list_lengths, vec![4; 6]);
    }
    Ok(())
}

#[test]
fn test_binary_body_size() -> Result<()> {
    let ply = cube_file()?;
    let mut bytes = Vec::new();
    let written = ply.write(&mut bytes, true)?;
    let header_len = ply.header().render(Encoding::NATIVE_BINARY).len();
    // 8 * 3 floats, then 6 * (1 length byte + 4 ints)
    assert_eq!(written as usize, header_len + 96 + 6 * 17);
    Ok(())
}

#[test]
fn test_add_properties_validation() {
    let mut ply = PlyFile::new();
    let xyz = to_bytes(&[0.0f32; 6]);

    assert!(matches!(
        ply.add_properties_to_element("vertex", &["x", "y", "z"], PrimitiveType::Float32, 3, xyz.clone(), PrimitiveType::Invalid, 0),
        Err(Error::BufferSizeMismatch { expected: 36, actual: 24, .. })
    ));
    assert!(ply.elements().is_empty());

    ply.add_properties_to_element("vertex", &["x", "y", "z"], PrimitiveType::Float32, 2, xyz, PrimitiveType::Invalid, 0)
        .unwrap();
    assert!(matches!(
        ply.add_properties_to_element("vertex", &["w"], PrimitiveType::Float32, 3, vec![0; 12], PrimitiveType::Invalid, 0),
        Err(Error::ElementCountMismatch { existing: 2, given: 3, .. })
    ));
    assert!(matches!(
        ply.add_properties_to_element("vertex", &["x"], PrimitiveType::Float32, 2, vec![0; 8], PrimitiveType::Invalid, 0),
        Err(Error::DuplicatePropertyName { .. })
    ));
    assert!(matches!(
        ply.add_properties_to_element("face", &["a", "b"], PrimitiveType::Int32, 1, vec![0; 8], PrimitiveType::Uint8, 1),
        Err(Error::MixedPropertyKinds(_))
    ));
    assert!(matches!(
        ply.add_properties_to_element("face", &["vi"], PrimitiveType::Int32, 1, vec![0; 4], PrimitiveType::Float32, 1),
        Err(Error::InvalidListLengthType { .. })
    ));
    assert!(matches!(
        ply.add_properties_to_element("face", &[], PrimitiveType::Int32, 1, vec![], PrimitiveType::Invalid, 0),
        Err(Error::EmptyRequest(_))
    ));
    assert_eq!(ply.elements().len(), 1);
    assert_eq!(ply.elements()[0].properties.len(), 3);
}

#[test]
fn test_huge_counts_are_rejected_by_size() {
    let mut ply = PlyFile::new();
    assert!(matches!(
        ply.add_properties_to_element("vertex", &["x", "y"], PrimitiveType::Float64, usize::MAX, vec![0; 16], PrimitiveType::Invalid, 0),
        Err(Error::BufferSizeMismatch { expected: usize::MAX, actual: 16, .. })
    ));
    assert!(matches!(
        ply.add_properties_to_element("face", &["vi"], PrimitiveType::Int32, usize::MAX / 2, vec![0; 12], PrimitiveType::Uint8, 3),
        Err(Error::BufferSizeMismatch { expected: usize::MAX, actual: 12, .. })
    ));
    assert!(ply.elements().is_empty());
}

#[test]
fn test_huge_declared_count_fails_read() -> Result<()> {
    let header = "ply\nformat binary_little_endian 1.0\nelement vertex 18446744073709551615\nproperty float x\nproperty float y\nend_header\n";
    let mut bytes = header.as_bytes().to_vec();
    bytes.extend_from_slice(&[0; 24]);

    let mut reader = Cursor::new(bytes.clone());
    let mut ply = PlyFile::parse_header(&mut reader)?;
    ply.request_properties("vertex", &["x", "y"], 0)?;
    assert!(matches!(ply.read(&mut reader), Err(Error::UnexpectedEndOfStream(_))));

    let mut reader = Cursor::new(bytes);
    let mut ply = PlyFile::parse_header(&mut reader)?;
    assert!(matches!(ply.read(&mut reader), Err(Error::UnexpectedEndOfStream(_))));
    Ok(())
}

#[test]
fn test_element_without_properties_is_written() -> Result<()> {
    let mut ply = PlyFile::new();
    ply.add_element("marker", 3)?;
    ply.add_properties_to_element("vertex", &["x"], PrimitiveType::Float32, 2, to_bytes(&[1.0f32, 2.0]), PrimitiveType::Invalid, 0)?;
    ply.add_element("vertex", 2)?;
    assert!(matches!(
        ply.add_element("marker", 4),
        Err(Error::ElementCountMismatch { existing: 3, given: 4, .. })
    ));

    for encoding in [Encoding::Ascii, Encoding::BinaryBigEndian] {
        let mut bytes = Vec::new();
        ply.write_with_encoding(&mut bytes, encoding)?;
        let mut reader = Cursor::new(bytes);
        let mut back = PlyFile::parse_header(&mut reader)?;
        assert_eq!(back.elements(), ply.elements());
        assert_eq!(back.elements()[0].name, "marker");
        assert!(back.elements()[0].properties.is_empty());

        let x = back.request_properties("vertex", &["x"], 0)?;
        let buffers = back.read(&mut reader)?;
        assert_eq!(buffers.get(x).unwrap().to_vec::<f32>()?, vec![1.0, 2.0]);
    }
    Ok(())
}

#[test]
fn test_fixed_list_count() -> Result<()> {
    let mut ply = PlyFile::new();
    ply.add_properties_to_element(
        "face",
        &["vertex_indices"],
        PrimitiveType::Uint32,
        2,
        to_bytes(&[0u32, 1, 2, 2, 3, 0]),
        PrimitiveType::Uint8,
        3,
    )?;
    let mut out = Vec::new();
    ply.write(&mut out, false)?;
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("property list uchar uint vertex_indices\n"));
    assert!(text.ends_with("end_header\n3 0 1 2\n3 2 3 0\n"));
    Ok(())
}

#[test]
fn test_write_requires_data_for_parsed_schema() -> Result<()> {
    let mut reader = Cursor::new(CUBE_ASCII.as_bytes());
    let ply = PlyFile::parse_header(&mut reader)?;
    let mut out = Vec::new();
    assert!(matches!(
        ply.write(&mut out, true),
        Err(Error::MissingPropertyData { .. })
    ));
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn test_progress_callback_sees_whole_stream() -> Result<()> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let mut reader = Cursor::new(CUBE_ASCII.as_bytes());
    let mut ply = PlyFile::parse_header(&mut reader)?;
    ply.set_progress_callback(32, move |info| sink.borrow_mut().push(info));
    ply.request_properties("vertex", &["x"], 0)?;
    ply.read(&mut reader)?;

    let seen = seen.borrow();
    assert!(!seen.is_empty());
    let last = seen[seen.len() - 1];
    assert_eq!(last.total_bytes, CUBE_ASCII.len() as u64);
    assert!(seen[0].current_bytes > ply.header_size());
    assert!(seen.iter().all(|i| i.current_bytes <= i.total_bytes));
    Ok(())
}
