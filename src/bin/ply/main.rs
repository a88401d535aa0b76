//! PLY CLI - Tool for inspecting, checking and converting PLY files.

use plycodec::prelude::*;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek};
use std::path::Path;
use std::process;
use std::time::Instant;

use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Any seekable buffered input.
trait Input: BufRead + Seek {}
impl<T: BufRead + Seek> Input for T {}

/// Command-line options shared by all commands.
struct Options {
    json: bool,
    mmap: bool,
    encoding: Option<Encoding>,
    progress: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            json: false,
            mmap: cfg!(feature = "mmap"),
            encoding: None,
            progress: None,
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut opts = Options::default();
    let mut level = "info";
    let mut positional: Vec<&str> = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            "-j" | "--json" => opts.json = true,
            "--ascii" => opts.encoding = Some(Encoding::Ascii),
            "--binary" => opts.encoding = Some(Encoding::NATIVE_BINARY),
            "--little-endian" => opts.encoding = Some(Encoding::BinaryLittleEndian),
            "--big-endian" => opts.encoding = Some(Encoding::BinaryBigEndian),
            "--mmap" => opts.mmap = true,
            "--no-mmap" => opts.mmap = false,
            "--progress" => match iter.next().and_then(|v| v.parse::<u64>().ok()) {
                Some(n) if n > 0 => opts.progress = Some(n),
                _ => fail("--progress needs a positive byte count"),
            },
            "-V" | "--version" => {
                println!("{}", plycodec::library_version());
                return;
            }
            _ => positional.push(arg),
        }
    }

    // Keep stdout clean for machine-readable output
    if opts.json {
        level = "error";
    }
    init_tracing(level);

    if positional.is_empty() {
        print_help();
        return;
    }

    match positional[0] {
        "info" | "i" => {
            let Some(&path) = positional.get(1) else {
                usage("ply-cli info <file.ply> [--json]");
            };
            cmd_info(path, &opts);
        }

        "check" | "k" => {
            let Some(&path) = positional.get(1) else {
                usage("ply-cli check <file.ply>");
            };
            cmd_check(path, &opts);
        }

        "convert" | "c" => {
            let (Some(&input), Some(&output)) = (positional.get(1), positional.get(2)) else {
                usage("ply-cli convert <in.ply> <out.ply> [--ascii|--binary|--big-endian]");
            };
            cmd_convert(input, output, &opts);
        }

        "help" | "h" | "-h" | "--help" => print_help(),

        // Default: if file exists, show info; otherwise error
        other => {
            if Path::new(other).exists() {
                cmd_info(other, &opts);
            } else {
                eprintln!("Unknown command: {}", other);
                eprintln!();
                print_help();
                process::exit(1);
            }
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr),
    );
    // Ignore a second initialization
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_help() {
    println!("ply-cli - PLY mesh file toolkit");
    println!();
    println!("USAGE:");
    println!("    ply-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info    <file>          Show header: format, comments, elements, properties");
    println!("    k, check   <file>          Decode the whole body and report totals");
    println!("    c, convert <in> <out>      Decode every property and re-encode");
    println!("    h, help                    Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose       Show debug output");
    println!("    -vv, --trace        Show trace output (very verbose)");
    println!("    -q, --quiet         Only show errors");
    println!("    -j, --json          Print info as JSON");
    println!("    --ascii             Convert to ASCII");
    println!("    --binary            Convert to binary in host byte order");
    println!("    --little-endian     Convert to binary little-endian");
    println!("    --big-endian        Convert to binary big-endian");
    println!("    --mmap, --no-mmap   Memory-map the input (default when built with mmap)");
    println!("    --progress <bytes>  Log decode progress every <bytes> bytes");
    println!("    -V, --version       Show version and build date");
    println!();
    println!("EXAMPLES:");
    println!("    ply-cli info bunny.ply                  # Header overview");
    println!("    ply-cli info bunny.ply --json           # Header as JSON");
    println!("    ply-cli check scan.ply --progress 1048576");
    println!("    ply-cli convert in.ply out.ply --ascii  # Binary to text");
    println!();
    println!("NOTES:");
    println!("    - Passing a .ply file directly is equivalent to 'info'");
    println!("    - RUST_LOG overrides the verbosity flags");
}

fn usage(text: &str) -> ! {
    eprintln!("Error: missing arguments");
    eprintln!("Usage: {}", text);
    process::exit(1);
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

// ============================================================================
// Input
// ============================================================================

fn open_input(path: &str, use_mmap: bool) -> std::io::Result<Box<dyn Input>> {
    let file = File::open(path)?;
    #[cfg(feature = "mmap")]
    if use_mmap && file.metadata()?.len() > 0 {
        // Safety: the file is opened read-only and only read through the map
        let map = unsafe { memmap2::Mmap::map(&file)? };
        debug!(bytes = map.len(), "memory-mapped input");
        return Ok(Box::new(std::io::Cursor::new(map)));
    }
    #[cfg(not(feature = "mmap"))]
    let _ = use_mmap;
    Ok(Box::new(BufReader::new(file)))
}

/// Open a file and parse its header, exiting on failure.
fn open_ply(path: &str, opts: &Options) -> (Box<dyn Input>, PlyFile) {
    info!("Opening: {}", path);
    let mut reader = match open_input(path, opts.mmap) {
        Ok(r) => r,
        Err(e) => fail(format!("failed to open {}: {}", path, e)),
    };
    match PlyFile::parse_header(&mut reader) {
        Ok(ply) => (reader, ply),
        Err(e) => fail(format!("{}: {}", path, e)),
    }
}

/// Request every property of every element, one request per property.
///
/// A property that cannot be requested is reported and skipped.
fn request_all(ply: &mut PlyFile) -> Vec<(usize, usize, RequestId)> {
    let schema: Vec<Element> = ply.elements().to_vec();
    let mut requests = Vec::new();
    for (ei, element) in schema.iter().enumerate() {
        for (pi, property) in element.properties.iter().enumerate() {
            match ply.request_properties(&element.name, &[property.name.as_str()], 0) {
                Ok(id) => requests.push((ei, pi, id)),
                Err(e) => warn!("skipping {}.{}: {}", element.name, property.name, e),
            }
        }
    }
    requests
}

fn attach_progress(ply: &mut PlyFile, opts: &Options) {
    if let Some(granularity) = opts.progress {
        ply.set_progress_callback(granularity, |p: ProgressInfo| {
            info!(
                "progress: {:5.1}% ({} / {} bytes)",
                p.fraction() * 100.0,
                p.current_bytes,
                p.total_bytes
            );
        });
    }
}

fn decode_all(path: &str, opts: &Options) -> (PlyFile, Vec<(usize, usize, RequestId)>, PlyBuffers) {
    let (mut reader, mut ply) = open_ply(path, opts);
    let requests = request_all(&mut ply);
    attach_progress(&mut ply, opts);

    let start = Instant::now();
    let buffers = match ply.read(&mut reader) {
        Ok(b) => b,
        Err(e) => fail(format!("{}: body decode failed: {}", path, e)),
    };
    info!("Decoded {} requests in {:.1?}", requests.len(), start.elapsed());
    (ply, requests, buffers)
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_info(path: &str, opts: &Options) {
    let (_, ply) = open_ply(path, opts);

    if opts.json {
        let elements: Vec<serde_json::Value> = ply
            .elements()
            .iter()
            .map(|e| {
                let properties: Vec<serde_json::Value> = e
                    .properties
                    .iter()
                    .map(|p| {
                        if p.is_list() {
                            serde_json::json!({
                                "name": p.name,
                                "type": p.ty.name(),
                                "list_type": p.list_type.name(),
                            })
                        } else {
                            serde_json::json!({ "name": p.name, "type": p.ty.name() })
                        }
                    })
                    .collect();
                serde_json::json!({ "name": e.name, "count": e.count, "properties": properties })
            })
            .collect();
        let doc = serde_json::json!({
            "file": path,
            "format": ply.encoding().name(),
            "version": ply.version(),
            "header_bytes": ply.header_size(),
            "comments": ply.comments(),
            "obj_info": ply.info(),
            "elements": elements,
        });
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(e),
        }
        return;
    }

    println!("File: {}", path);
    println!("Format: {} {}", ply.encoding(), ply.version());
    println!("Header: {} bytes", ply.header_size());
    if !ply.comments().is_empty() {
        println!();
        println!("Comments:");
        for c in ply.comments() {
            println!("  {}", c);
        }
    }
    if !ply.info().is_empty() {
        println!();
        println!("Info:");
        for i in ply.info() {
            println!("  {}", i);
        }
    }
    println!();
    println!("Elements:");
    for e in ply.elements() {
        println!("  {} ({})", e.name, e.count);
        for p in &e.properties {
            if p.is_list() {
                println!("    list {} {} {}", p.list_type, p.ty, p.name);
            } else {
                println!("    {} {}", p.ty, p.name);
            }
        }
    }
}

fn cmd_check(path: &str, opts: &Options) {
    let (ply, requests, buffers) = decode_all(path, opts);

    println!("File: {}", path);
    println!("Format: {}", ply.encoding());
    println!();
    for (ei, element) in ply.elements().iter().enumerate() {
        let mut bytes = 0usize;
        let mut list_values = 0usize;
        for (_, _, id) in requests.iter().filter(|(e, _, _)| *e == ei) {
            if let Some(data) = buffers.get(*id) {
                bytes += data.num_bytes();
                if data.is_list() {
                    list_values += data.num_values();
                }
            }
        }
        if element.has_lists() {
            println!(
                "  {:<16} {:>10} instances {:>12} bytes {:>12} list values",
                element.name, element.count, bytes, list_values
            );
        } else {
            println!("  {:<16} {:>10} instances {:>12} bytes", element.name, element.count, bytes);
        }
    }
    println!();
    println!("OK");
}

fn cmd_convert(input: &str, output: &str, opts: &Options) {
    let (ply, requests, mut buffers) = decode_all(input, opts);
    let encoding = opts.encoding.unwrap_or(ply.encoding());

    let mut out = PlyFile::new();
    out.comments_mut().extend(ply.comments().iter().cloned());
    out.info_mut().extend(ply.info().iter().cloned());

    // Declare every element up front: keeps header order and carries
    // elements that have no properties.
    for element in ply.elements() {
        if element.properties.is_empty() {
            debug!("{}: no properties, copying declaration only", element.name);
        }
        if let Err(e) = out.add_element(&element.name, element.count) {
            fail(format!("{}: {}", element.name, e));
        }
    }

    for (ei, pi, id) in requests {
        let element = &ply.elements()[ei];
        let property = &element.properties[pi];
        let Some(data) = buffers.take(id) else {
            continue;
        };
        let added = if data.is_list() {
            out.add_list_property_to_element(
                &element.name,
                &property.name,
                data.ty,
                data.buffer,
                data.list_type,
                data.list_lengths,
            )
        } else {
            out.add_properties_to_element(
                &element.name,
                &[property.name.as_str()],
                data.ty,
                data.count,
                data.buffer,
                PrimitiveType::Invalid,
                0,
            )
        };
        if let Err(e) = added {
            fail(format!("{}.{}: {}", element.name, property.name, e));
        }
    }

    let file = match File::create(output) {
        Ok(f) => f,
        Err(e) => fail(format!("failed to create {}: {}", output, e)),
    };
    let mut writer = BufWriter::new(file);
    let start = Instant::now();
    match out.write_with_encoding(&mut writer, encoding) {
        Ok(bytes) => {
            info!("Wrote {} bytes in {:.1?}", bytes, start.elapsed());
            println!("{} -> {} ({}, {} bytes)", input, output, encoding, bytes);
        }
        Err(e) => fail(format!("{}: {}", output, e)),
    }
}
