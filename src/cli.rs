// Command-line front end for vcdelta.
//
// Subcommands map onto the file helpers in `io` plus a pair of inspection
// commands that dump headers and instructions of an existing delta.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::buffer::{ByteBuffer, SliceBuffer};
use crate::compress::custom_table::CustomCodeTable;
use crate::compress::encoder::{DEFAULT_CHUNK_SIZE, DEFAULT_MIN_MATCH, EncodeOptions, MAX_CHUNK_SIZE};
use crate::error::VcdiffError;
use crate::hash::DEFAULT_BLOCK_SIZE;
use crate::io::{self as fileio, DecodeStats, EncodeStats, IoError};
use crate::vcdiff::address_cache::{AddressCache, DEFAULT_NEAR, DEFAULT_SAME};
use crate::vcdiff::code_table::{CodeTable, VCD_ADD, VCD_COPY, VCD_RUN, inst_name};
use crate::vcdiff::decoder::InstructionDecoder;
use crate::vcdiff::header::{FileHeader, WindowFlags};
use crate::vcdiff::window::WindowDecoder;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1usize << 10),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1 << 20),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    let num: usize = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Dictionary-based VCDIFF delta encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "vcdelta",
    version,
    about = "VCDIFF delta encoder/decoder with SDCH extensions",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Suppress everything but errors.
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// More logging (-v debug, -vv trace).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode TARGET against a dictionary, writing DELTA.
    Encode(EncodeArgs),
    /// Rebuild OUTPUT from a dictionary and DELTA.
    Decode(DecodeArgs),
    /// Print the file header and every window header of a delta.
    Headers(PrintArgs),
    /// Print headers and the instructions of every window.
    Delta(PrintArgs),
    /// Print build and default settings.
    Config,
}

#[derive(Args, Debug, Clone)]
struct EncodeTuningArgs {
    /// Interleave data, instructions and addresses in one section.
    #[arg(long)]
    interleaved: bool,

    /// Add an Adler-32 checksum to every window.
    #[arg(long)]
    checksum: bool,

    /// Target bytes per window (supports K/M/G suffix).
    #[arg(long = "chunk-size", value_parser = parse_byte_size, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Dictionary block size for the match index.
    #[arg(long = "block-size", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Shortest match emitted as a COPY.
    #[arg(long = "min-match", default_value_t = DEFAULT_MIN_MATCH)]
    min_match: usize,
}

impl EncodeTuningArgs {
    fn options(&self) -> EncodeOptions {
        EncodeOptions {
            interleaved: self.interleaved,
            checksum: self.checksum,
            chunk_size: self.chunk_size,
            block_size: self.block_size,
            min_match: self.min_match,
            ..EncodeOptions::default()
        }
    }
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Dictionary file.
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    #[command(flatten)]
    tuning: EncodeTuningArgs,

    /// File to encode.
    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    /// Delta file to write.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Dictionary file.
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    /// Delta file to decode.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    /// File to write.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// VCDIFF delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("vcdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv)
        && let Cmd::Encode(a) = &cli.command
    {
        let _ = a.tuning.options().validate();
    }
}

fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

fn check_output(path: &Path, force: bool) -> Result<(), IoError> {
    if path.exists() && !force {
        return Err(IoError::File {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "output file exists, use -f to overwrite",
            ),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config(out: &mut dyn Write) -> io::Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    writeln!(out, "vcdelta version {version}")?;
    writeln!(out, "ADLER32_SIMD={}", cfg!(feature = "adler32") as u8)?;
    writeln!(out, "FILE_IO={}", cfg!(feature = "file-io") as u8)?;
    writeln!(out, "DEFAULT_CHUNK_SIZE={DEFAULT_CHUNK_SIZE}")?;
    writeln!(out, "MAX_CHUNK_SIZE={MAX_CHUNK_SIZE}")?;
    writeln!(out, "DEFAULT_BLOCK_SIZE={DEFAULT_BLOCK_SIZE}")?;
    writeln!(out, "DEFAULT_MIN_MATCH={DEFAULT_MIN_MATCH}")?;
    writeln!(out, "DEFAULT_NEAR={DEFAULT_NEAR}")?;
    writeln!(out, "DEFAULT_SAME={DEFAULT_SAME}")?;
    writeln!(out, "sizeof(usize)={}", std::mem::size_of::<usize>())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Encode / decode commands
// ---------------------------------------------------------------------------

fn digest(d: Option<[u8; 32]>) -> Option<String> {
    d.map(|d| fileio::hex(&d))
}

fn cmd_encode(cli: &Cli, args: &EncodeArgs) -> Result<(), IoError> {
    check_output(&args.delta, cli.force)?;
    let stats: EncodeStats = fileio::encode_file(
        &args.dictionary,
        &args.target,
        &args.delta,
        args.tuning.options(),
    )?;

    if cli.verbose > 0 && !cli.quiet {
        eprintln!(
            "vcdelta: encoder: dictionary {} bytes, target {} bytes, delta {} bytes, \
             windows: {}, copied: {}",
            stats.dictionary_size, stats.target_size, stats.delta_size, stats.windows, stats.copied_bytes
        );
    }
    if cli.json_output {
        let json = serde_json::json!({
            "command": "encode",
            "dictionary_size": stats.dictionary_size,
            "target_size": stats.target_size,
            "delta_size": stats.delta_size,
            "windows": stats.windows,
            "copied_bytes": stats.copied_bytes,
            "interleaved": args.tuning.interleaved,
            "checksum": args.tuning.checksum,
            "dictionary_sha256": digest(stats.dictionary_sha256),
            "target_sha256": digest(stats.target_sha256),
        });
        eprintln!("{json:#}");
    }
    Ok(())
}

fn cmd_decode(cli: &Cli, args: &DecodeArgs) -> Result<(), IoError> {
    check_output(&args.output, cli.force)?;
    let stats: DecodeStats = fileio::decode_file(&args.dictionary, &args.delta, &args.output)?;

    if cli.verbose > 0 && !cli.quiet {
        eprintln!(
            "vcdelta: decoder: output {} bytes, windows: {}",
            stats.output_size, stats.windows
        );
    }
    if cli.json_output {
        let json = serde_json::json!({
            "command": "decode",
            "dictionary_size": stats.dictionary_size,
            "delta_size": stats.delta_size,
            "output_size": stats.output_size,
            "windows": stats.windows,
            "output_sha256": digest(stats.output_sha256),
        });
        eprintln!("{json:#}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Print commands (headers, delta)
// ---------------------------------------------------------------------------

fn flag_names<I: Iterator<Item = (&'static str, T)>, T>(names: I) -> String {
    let names: Vec<String> = names.map(|(n, _)| format!("VCD_{n}")).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" ")
    }
}

/// Section readers for one window.  Interleaved windows read every kind
/// of field from the instructions stream.
struct Sections<'a> {
    data: SliceBuffer<'a>,
    inst: SliceBuffer<'a>,
    addr: SliceBuffer<'a>,
    interleaved: bool,
}

impl<'a> Sections<'a> {
    fn data(&mut self) -> &mut SliceBuffer<'a> {
        if self.interleaved { &mut self.inst } else { &mut self.data }
    }

    fn addr(&mut self) -> &mut SliceBuffer<'a> {
        if self.interleaved { &mut self.inst } else { &mut self.addr }
    }
}

fn print_instructions(
    out: &mut dyn Write,
    window: &WindowDecoder,
    body: &[u8],
    table: &CodeTable,
    cache: &mut AddressCache,
    target_offset: u64,
) -> Result<(), IoError> {
    let mut sections = Sections {
        data: SliceBuffer::new(window.data()),
        inst: SliceBuffer::new(if window.is_interleaved() { body } else { window.instructions() }),
        addr: SliceBuffer::new(window.addresses()),
        interleaved: window.is_interleaved(),
    };
    let mut decoder = InstructionDecoder::new(table);
    cache.reset();

    let source_length = window.source_length();
    let target_length = window.target_length();
    let mut produced = 0usize;

    writeln!(out, "  Offset Type     Size Addr")?;
    while produced < target_length && sections.inst.can_read() {
        let i = decoder.next(&mut sections.inst)?;
        let offset = target_offset + produced as u64;
        match i.inst {
            VCD_ADD => {
                sections.data().skip(i.size)?;
                writeln!(out, "  {offset:06} {:<4} {:8}", inst_name(i.inst), i.size)?;
            }
            VCD_RUN => {
                let byte = sections.data().read_byte()?;
                writeln!(out, "  {offset:06} {:<4} {:8} {byte:#04x}", inst_name(i.inst), i.size)?;
            }
            VCD_COPY => {
                let here = (source_length + produced) as u64;
                let addr = cache.decode(here, i.mode, sections.addr())? as usize;
                let shown = if addr < source_length {
                    format!("S@{}", window.source_position() + addr)
                } else {
                    format!("T@{}", addr - source_length)
                };
                writeln!(out, "  {offset:06} {:<4} {:8} {shown} (mode {})", inst_name(i.inst), i.size, i.mode)?;
            }
            _ => {}
        }
        produced += i.size;
    }
    Ok(())
}

/// Dump the headers (and optionally the instructions) of `delta`.
fn print_delta(out: &mut dyn Write, delta: &[u8], with_instructions: bool) -> Result<(), IoError> {
    let mut buf = SliceBuffer::new(delta);
    let header = FileHeader::parse(&mut buf)?;
    let version = if header.is_extended() { "S" } else { "0" };

    writeln!(out, "VCDIFF version:               {version}")?;
    writeln!(out, "VCDIFF header size:           {}", buf.position())?;
    writeln!(out, "VCDIFF header indicator:      {}", flag_names(header.flags.iter_names()))?;
    if let Some(app) = header.app_header.as_deref()
        && !app.is_empty()
    {
        writeln!(out, "VCDIFF application header:    {}", String::from_utf8_lossy(app))?;
    }

    let custom = match header.code_table.as_deref() {
        Some(payload) => {
            let c = CustomCodeTable::decode(payload)?;
            writeln!(out, "VCDIFF custom code table:     near {}, same {}", c.near(), c.same())?;
            Some(c)
        }
        None => None,
    };
    let default_table;
    let (table, near, same) = match &custom {
        Some(c) => (c.table(), c.near(), c.same()),
        None => {
            default_table = CodeTable::rfc3284();
            (&default_table, DEFAULT_NEAR, DEFAULT_SAME)
        }
    };
    let mut cache = AddressCache::new(near, same);

    let mut window_num = 0u64;
    let mut target_offset = 0u64;
    while buf.can_read() {
        let window = WindowDecoder::decode(&mut buf, usize::MAX, header.is_extended())?;
        let body = if window.is_interleaved() {
            buf.read_bytes(window.interleaved_length())?
        } else {
            Vec::new()
        };
        let wh = window.header();

        writeln!(out)?;
        writeln!(out, "VCDIFF window number:         {window_num}")?;
        writeln!(out, "VCDIFF window indicator:      {}", flag_names(wh.win_ind.iter_names()))?;
        if let Some(sum) = window.checksum() {
            writeln!(out, "VCDIFF adler32 checksum:      {sum:08X}")?;
        }
        if target_offset > 0 {
            writeln!(out, "VCDIFF window at offset:      {target_offset}")?;
        }
        if wh.win_ind.contains(WindowFlags::SOURCE) {
            writeln!(out, "VCDIFF source segment length: {}", wh.source_length)?;
            writeln!(out, "VCDIFF source segment offset: {}", wh.source_position)?;
        }
        writeln!(out, "VCDIFF delta encoding length: {}", wh.delta_length)?;
        writeln!(out, "VCDIFF target window length:  {}", wh.target_length)?;
        writeln!(out, "VCDIFF data section length:   {}", wh.data_length)?;
        writeln!(out, "VCDIFF inst section length:   {}", wh.inst_length)?;
        writeln!(out, "VCDIFF addr section length:   {}", wh.addr_length)?;
        if window.is_interleaved() {
            writeln!(out, "VCDIFF section layout:        interleaved")?;
        }

        if with_instructions {
            print_instructions(out, &window, &body, table, &mut cache, target_offset)?;
        }

        target_offset += wh.target_length;
        window_num += 1;
    }
    Ok(())
}

fn cmd_print(path: &Path, with_instructions: bool) -> Result<(), IoError> {
    let delta = std::fs::read(path).map_err(|source| IoError::File {
        path: path.to_path_buf(),
        source,
    })?;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    print_delta(&mut out, &delta, with_instructions)?;
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.quiet, cli.verbose)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    let result = match &cli.command {
        Cmd::Encode(args) => cmd_encode(&cli, args),
        Cmd::Decode(args) => cmd_decode(&cli, args),
        Cmd::Headers(args) => cmd_print(&args.delta, false),
        Cmd::Delta(args) => cmd_print(&args.delta, true),
        Cmd::Config => cmd_config(&mut io::stdout().lock()).map_err(IoError::from),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            if let IoError::Codec(VcdiffError::Eod) = e {
                eprintln!("vcdelta: delta is truncated: {e}");
            } else {
                eprintln!("vcdelta: {e}");
            }
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
