use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use jitsort::{ConfigFile, GenerateConfig, Generator, KeyMode, SortRoutine};

// Wrapper types for clap ValueEnum support
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KeyModeArg {
    Integer,
    LeadingByte,
}

impl From<KeyModeArg> for KeyMode {
    fn from(arg: KeyModeArg) -> Self {
        match arg {
            KeyModeArg::Integer => KeyMode::Integer,
            KeyModeArg::LeadingByte => KeyMode::LeadingByte,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum FormatArg {
    #[default]
    Human,
    Json,
}

#[derive(Parser)]
#[command(name = "jitsort")]
#[command(about = "Sort by generating straight-line copy code", long_about = None)]
struct Cli {
    /// Trace generation (classification, region sizes, emitted groups)
    #[arg(long, global = true)]
    trace: bool,

    /// Config file (defaults to ./jitsort.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured key mode (not accepted by `strings`)
    #[arg(long, global = true, value_enum)]
    key_mode: Option<KeyModeArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort unsigned integers of a fixed byte width
    Ints {
        /// Element width in bytes (1, 2, 4 or 8)
        #[arg(long, default_value = "4", value_parser = parse_width)]
        width: usize,

        /// Values to sort
        #[arg(required = true)]
        values: Vec<u64>,
    },
    /// Sort the bytes of a string
    Bytes {
        /// Text whose bytes are sorted
        text: String,
    },
    /// Sort NUL-terminated words by their first byte, whatever the
    /// configured key mode
    Strings {
        /// Words to sort
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Print the machine code generated for a set of integers
    Dump {
        /// Element width in bytes (1, 2, 4 or 8)
        #[arg(long, default_value = "4", value_parser = parse_width)]
        width: usize,

        /// Output format (human, json)
        #[arg(long, value_enum, default_value = "human")]
        format: FormatArg,

        /// Values to sort
        #[arg(required = true)]
        values: Vec<u64>,
    },
}

fn parse_width(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(w @ (1 | 2 | 4 | 8)) => Ok(w),
        _ => Err(format!("width must be 1, 2, 4 or 8, got '{}'", s)),
    }
}

fn init_logging(trace: bool) {
    let default_filter = if trace { "jitsort=trace" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn load_config(path: Option<&Path>, key_mode: Option<KeyModeArg>) -> Result<GenerateConfig, String> {
    let file = match path {
        Some(path) => ConfigFile::load_file(path).map_err(|e| e.to_string())?,
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(jitsort::config::CONFIG_FILE_NAME).exists() {
                ConfigFile::load(&cwd).map_err(|e| e.to_string())?
            } else {
                ConfigFile::default()
            }
        }
    };
    let mut config = file.to_generate_config();
    if let Some(mode) = key_mode {
        config.key_mode = mode.into();
    }
    Ok(config)
}

fn encode_values(values: &[u64], width: usize) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::with_capacity(values.len() * width);
    for &value in values {
        if width < 8 && value >> (width * 8) != 0 {
            return Err(format!("value {} does not fit in {} bytes", value, width));
        }
        bytes.extend_from_slice(&value.to_le_bytes()[..width]);
    }
    Ok(bytes)
}

fn decode_values(bytes: &[u8], width: usize) -> Vec<u64> {
    bytes
        .chunks_exact(width)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf[..width].copy_from_slice(chunk);
            u64::from_le_bytes(buf)
        })
        .collect()
}

fn run_routine(routine: &SortRoutine<'_>, input_len: usize) -> Result<Vec<u8>, String> {
    if routine.placed_len() < input_len {
        log::warn!(
            "{} bytes have keys of {} or more and are left out",
            input_len - routine.placed_len(),
            jitsort::BUCKET_COUNT
        );
    }
    let output = routine
        .run()
        .ok_or_else(|| "output allocation failed".to_string())?;
    Ok(output.to_vec())
}

fn sort_ints(generator: &Generator, values: &[u64], width: usize) -> Result<(), String> {
    let input = encode_values(values, width)?;
    let routine = generator
        .sort_fixed(&input, width)
        .map_err(|e| e.to_string())?;
    let output = run_routine(&routine, input.len())?;

    let sorted: Vec<String> = decode_values(&output, width)
        .iter()
        .map(|v| v.to_string())
        .collect();
    println!("{}", sorted.join(" "));
    Ok(())
}

fn sort_bytes(generator: &Generator, text: &str) -> Result<(), String> {
    let routine = generator
        .sort_fixed(text.as_bytes(), 1)
        .map_err(|e| e.to_string())?;
    let output = run_routine(&routine, text.len())?;
    println!("{}", String::from_utf8_lossy(&output));
    Ok(())
}

fn sort_strings(config: GenerateConfig, words: &[String]) -> Result<(), String> {
    let mut packed = Vec::new();
    for word in words {
        if word.is_empty() || word.contains('\0') {
            return Err(format!("invalid word {:?}", word));
        }
        packed.extend_from_slice(word.as_bytes());
        packed.push(0);
    }

    let generator = Generator::new(GenerateConfig {
        key_mode: KeyMode::LeadingByte,
        ..config
    });
    let routine = generator
        .sort_packed(&packed, None, |rest| {
            rest.iter().position(|&b| b == 0).map_or(0, |nul| nul + 1)
        })
        .map_err(|e| e.to_string())?;
    let output = run_routine(&routine, packed.len())?;

    for word in output.split(|&b| b == 0).filter(|w| !w.is_empty()) {
        println!("{}", String::from_utf8_lossy(word));
    }
    Ok(())
}

#[derive(Serialize)]
struct DumpReport {
    groups: usize,
    code_len: usize,
    region_size: usize,
    output_len: usize,
    placed_len: usize,
    code: String,
}

fn dump(
    generator: &Generator,
    values: &[u64],
    width: usize,
    format: FormatArg,
) -> Result<(), String> {
    let input = encode_values(values, width)?;
    let routine = generator
        .sort_fixed(&input, width)
        .map_err(|e| e.to_string())?;
    let code = routine.code();

    match format {
        FormatArg::Human => {
            println!(
                "{} groups, {} code bytes, {} byte region, {} output bytes ({} placed)",
                routine.groups(),
                code.len(),
                routine.region_size(),
                routine.output_len(),
                routine.placed_len()
            );
            for (i, line) in code.chunks(16).enumerate() {
                let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
                println!("{:06x}  {}", i * 16, hex.join(" "));
            }
        }
        FormatArg::Json => {
            let report = DumpReport {
                groups: routine.groups(),
                code_len: code.len(),
                region_size: routine.region_size(),
                output_len: routine.output_len(),
                placed_len: routine.placed_len(),
                code: code.iter().map(|b| format!("{:02x}", b)).collect(),
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| e.to_string())?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.trace);

    let config = match load_config(cli.config.as_deref(), cli.key_mode) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let generator = Generator::new(config);

    let result = match cli.command {
        Commands::Ints { width, values } => sort_ints(&generator, &values, width),
        Commands::Bytes { text } => sort_bytes(&generator, &text),
        Commands::Strings { .. } if cli.key_mode.is_some() => Err(
            "--key-mode does not apply to strings, which always key on the leading byte"
                .to_string(),
        ),
        Commands::Strings { words } => sort_strings(config, &words),
        Commands::Dump {
            width,
            format,
            values,
        } => dump(&generator, &values, width, format),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
