//! scriptval CLI
//!
//! Developer tool for looking at captured messages: converts wire messages
//! to JSON and back, and dumps wire messages value by value.

use clap::{Parser, Subcommand};
use scriptval_core::{CodecConfig, ConfigError, StaticRegistry};
use scriptval_runtime::{
    BitBuffer, BitReader, JsonCodec, JsonError, JsonMode, ProtocolError, ValueList, WireCodec,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "svc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convert and inspect scriptval wire and JSON documents", long_about = None)]
struct Cli {
    /// Codec configuration (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Registry manifest resolving external references (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a wire message and print it as JSON
    WireToJson {
        /// Wire message file
        input: PathBuf,

        /// Fail on values that cannot be persisted instead of writing placeholders
        #[arg(long)]
        durable: bool,
    },

    /// Encode a JSON document as a wire message
    JsonToWire {
        /// JSON document file
        input: PathBuf,

        /// Where to write the wire message
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decode a wire message and print each value
    Inspect {
        /// Wire message file
        input: PathBuf,

        /// Also print the raw bytes
        #[arg(long)]
        hex: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("wire: {0}")]
    Wire(#[from] ProtocolError),

    #[error("json: {0}")]
    Json(#[from] JsonError),
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(path: Option<&Path>) -> Result<CodecConfig, CliError> {
    match path {
        Some(path) => Ok(CodecConfig::from_file(path)?),
        None => Ok(CodecConfig::default()),
    }
}

fn load_registry(path: Option<&Path>) -> Result<StaticRegistry, CliError> {
    match path {
        Some(path) => Ok(StaticRegistry::from_file(path)?),
        None => Ok(StaticRegistry::new()),
    }
}

fn decode_wire(bytes: &[u8], config: &CodecConfig) -> Result<ValueList, CliError> {
    let mut reader = BitReader::new(bytes);
    let list = ValueList::from_wire_with_config(&mut reader, &config.wire)?;
    Ok(list)
}

fn run_wire_to_json(
    input: &Path,
    durable: bool,
    config: &CodecConfig,
    registry: &StaticRegistry,
) -> Result<String, CliError> {
    let list = decode_wire(&read_file(input)?, config)?;
    let mode = if durable {
        JsonMode::Durable
    } else {
        JsonMode::Transient
    };
    Ok(list.to_json_with_config(mode, registry, &config.json)?)
}

/// Returns the number of bytes written
fn run_json_to_wire(
    input: &Path,
    output: &Path,
    config: &CodecConfig,
    registry: &StaticRegistry,
) -> Result<usize, CliError> {
    let text = fs::read_to_string(input).map_err(|source| CliError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let list = ValueList::from_json_with_config(&text, registry, &config.json)?;

    let mut buf = BitBuffer::new();
    list.to_wire_with_config(&mut buf, registry, &config.wire)?;
    let bytes = buf.into_bytes();
    fs::write(output, &bytes).map_err(|source| CliError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    Ok(bytes.len())
}

fn run_inspect(input: &Path, show_hex: bool, config: &CodecConfig) -> Result<String, CliError> {
    let bytes = read_file(input)?;
    let list = decode_wire(&bytes, config)?;

    let mut out = String::new();
    if show_hex {
        out.push_str(&format!("{} bytes: {}\n", bytes.len(), hex::encode(&bytes)));
    }
    out.push_str(&format!("{} values\n", list.len()));
    for (i, cell) in list.iter().enumerate() {
        out.push_str(&format!("[{}] {}: {}\n", i, cell.type_name(), cell));
    }
    Ok(out)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;
    let registry = load_registry(cli.registry.as_deref())?;
    debug!("Registry holds {} references", registry.len());

    match cli.command {
        Commands::WireToJson { input, durable } => {
            println!("{}", run_wire_to_json(&input, durable, &config, &registry)?);
        }
        Commands::JsonToWire { input, output } => {
            let written = run_json_to_wire(&input, &output, &config, &registry)?;
            info!("Wrote {} bytes to {}", written, output.display());
        }
        Commands::Inspect { input, hex } => {
            print!("{}", run_inspect(&input, hex, &config)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptval_runtime::ValueCell;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn registry_manifest(dir: &TempDir) -> StaticRegistry {
        let path = write(
            dir,
            "registry.toml",
            b"[[resource]]\nname = \"race\"\nid = 17\n\n[[element]]\nid = 42\n",
        );
        load_registry(Some(&path)).unwrap()
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "svc",
            "wire-to-json",
            "msg.bin",
            "--durable",
            "--registry",
            "reg.toml",
        ])
        .unwrap();
        assert_eq!(cli.registry, Some(PathBuf::from("reg.toml")));
        assert!(matches!(
            cli.command,
            Commands::WireToJson { durable: true, .. }
        ));
    }

    #[test]
    fn test_json_to_wire_and_back() {
        let dir = TempDir::new().unwrap();
        let registry = registry_manifest(&dir);
        let config = CodecConfig::default();
        let input = write(
            &dir,
            "in.json",
            br#"[1,"^R^race","^E^42",{"a":[true,null]},"^T^0"]"#,
        );
        let output = dir.path().join("out.bin");

        let written = run_json_to_wire(&input, &output, &config, &registry).unwrap();
        assert_eq!(written, fs::read(&output).unwrap().len());

        let json = run_wire_to_json(&output, true, &config, &registry).unwrap();
        assert_eq!(json, r#"[1,"^R^race","^E^42",{"a":[true,null]},"^T^0"]"#);
    }

    #[test]
    fn test_wire_to_json_transient_placeholder() {
        let dir = TempDir::new().unwrap();
        let registry = registry_manifest(&dir);
        let list: ValueList = vec![ValueCell::ExternalRef(17)].into();
        let bytes = list.to_wire_bytes(&registry).unwrap();
        let input = write(&dir, "msg.bin", &bytes);

        // Decoded against an empty registry, the reference cannot be named.
        let empty = StaticRegistry::new();
        let config = CodecConfig::default();
        assert_eq!(
            run_wire_to_json(&input, false, &config, &empty).unwrap(),
            "[false]"
        );
        assert!(matches!(
            run_wire_to_json(&input, true, &config, &empty),
            Err(CliError::Json(JsonError::UnserializableReference(17)))
        ));
    }

    #[test]
    fn test_inspect_lists_values() {
        let dir = TempDir::new().unwrap();
        let input = write(&dir, "msg.bin", &[0x02, 0x19, 0x01, 0x80]);

        let out = run_inspect(&input, true, &CodecConfig::default()).unwrap();
        assert_eq!(
            out,
            "4 bytes: 02190180\n2 values\n[0] boolean: true\n[1] number: 3\n"
        );
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let input = write(&dir, "msg.bin", &[0x02, 0x19]);
        assert!(matches!(
            run_inspect(&input, false, &CodecConfig::default()),
            Err(CliError::Wire(_))
        ));
    }

    #[test]
    fn test_config_file_is_validated() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "codec.toml", b"[json]\nmax_depth = 0\n");
        assert!(matches!(
            load_config(Some(&path)),
            Err(CliError::Config(ConfigError::Invalid(_)))
        ));

        let path = write(&dir, "codec.toml", b"[wire]\nnumber_policy = \"lossless\"\n");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.wire.number_policy, scriptval_core::NumberPolicy::Lossless);
    }

    #[test]
    fn test_missing_input() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.bin");
        assert!(matches!(
            run_inspect(&missing, false, &CodecConfig::default()),
            Err(CliError::Read { .. })
        ));
    }
}
