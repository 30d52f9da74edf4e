use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use dynconf::config::{load_config, ConfigError, ServiceConfig};
use dynconf::observability::logging;
use dynconf::resolution::{ConfigService, ProcessEnv};
use dynconf::store::{ConfigStore, FileStore};
use dynconf::validation::ConfigSet;
use dynconf::{ConfigValue, SchemaRegistry, SetError};

#[derive(Parser)]
#[command(name = "dynconf-cli")]
#[command(about = "Administration CLI for dynconf value stores", long_about = None)]
struct Cli {
    /// Service settings file. Missing file means defaults.
    #[arg(short, long, default_value = "dynconf.toml")]
    config: PathBuf,

    /// Store file; overrides `store.path` from the settings.
    #[arg(short, long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a key and show where its value came from
    Get { key: String },
    /// Validate, persist and announce a new value
    Set {
        key: String,
        value: String,
        #[arg(long, default_value = "cli")]
        actor: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Check a value against its schema without writing it
    Validate { key: String, value: String },
    /// Estimate the impact of changing a key
    Impact { key: String, value: String },
    /// Detect conflicts in the effective configuration, with optional KEY=VALUE overrides
    Conflicts {
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
    /// List registered schemas
    Schemas,
    /// Show the store's audit trail
    Audit,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            ServiceConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(store) = &cli.store {
        config.store.path = store.display().to_string();
    }
    logging::init_logging("warn");

    let schemas = Arc::new(SchemaRegistry::with_defaults());
    let store = Arc::new(FileStore::open(&config.store.path)?);
    let service = ConfigService::new(config, schemas.clone(), store.clone(), Arc::new(ProcessEnv))?;

    let (output, code) = match cli.command {
        Commands::Get { key } => match service.resolve_with_metadata(&key).await {
            Ok(resolved) => {
                let mut out = serde_json::to_value(&resolved)?;
                if let Some(schema) = schemas.get(&key) {
                    out["value"] = Value::String(schema.redact(&resolved.value));
                }
                (out, ExitCode::SUCCESS)
            }
            Err(e) => (json!({ "error": e.to_string() }), ExitCode::FAILURE),
        },
        Commands::Set {
            key,
            value,
            actor,
            reason,
        } => {
            let value = parse_value(&schemas, &key, &value);
            match service.set_and_notify(&key, value, &actor, &reason).await {
                Ok(outcome) => {
                    let mut out = serde_json::to_value(&outcome)?;
                    if let Some(schema) = schemas.get(&key).filter(|s| s.sensitive) {
                        out["new_value"] = Value::String(schema.redact(&outcome.new_value));
                        out["old_value"] = Value::String("***".into());
                        out["record"]["raw_value"] = Value::String("***".into());
                    }
                    (out, ExitCode::SUCCESS)
                }
                Err(e) => (set_error_json(&e)?, ExitCode::FAILURE),
            }
        }
        Commands::Validate { key, value } => {
            let value = parse_value(&schemas, &key, &value);
            let mut report = service.validate_value(&key, &value);
            let code = if report.is_valid { ExitCode::SUCCESS } else { ExitCode::FAILURE };
            if schemas.get(&key).is_some_and(|s| s.sensitive) {
                report.coerced_value = None;
            }
            (serde_json::to_value(&report)?, code)
        }
        Commands::Impact { key, value } => {
            let value = parse_value(&schemas, &key, &value);
            (serde_json::to_value(service.assess_impact(&key, &value).await)?, ExitCode::SUCCESS)
        }
        Commands::Conflicts { overrides } => {
            let mut set: ConfigSet = service.effective_config().await;
            for pair in &overrides {
                let Some((key, raw)) = pair.split_once('=') else {
                    return Err(format!("expected KEY=VALUE, got '{}'", pair).into());
                };
                set.insert(key.to_string(), parse_value(&schemas, key, raw));
            }
            let conflicts = service.detect_conflicts(&set);
            let code = if conflicts.iter().any(|c| c.is_error()) {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            (serde_json::to_value(&conflicts)?, code)
        }
        Commands::Schemas => {
            let list: Vec<_> = schemas.keys().into_iter().filter_map(|k| schemas.get(&k)).collect();
            let list: Vec<&dynconf::ConfigSchema> = list.iter().map(|s| s.as_ref()).collect();
            (serde_json::to_value(&list)?, ExitCode::SUCCESS)
        }
        Commands::Audit => {
            let mut audit = serde_json::to_value(store.audit_log().await?)?;
            if let Value::Array(entries) = &mut audit {
                for entry in entries {
                    let sensitive = entry["key"]
                        .as_str()
                        .and_then(|k| schemas.get(k))
                        .is_some_and(|s| s.sensitive);
                    if sensitive {
                        entry["old_raw_value"] = Value::String("***".into());
                        entry["new_raw_value"] = Value::String("***".into());
                    }
                }
            }
            (audit, ExitCode::SUCCESS)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    service.shutdown().await?;
    Ok(code)
}

/// Parse with the schema's type; fall back to a string so validation reports the mismatch.
fn parse_value(schemas: &SchemaRegistry, key: &str, raw: &str) -> ConfigValue {
    schemas
        .get(key)
        .and_then(|s| s.value_type.parse(raw).ok())
        .unwrap_or_else(|| ConfigValue::String(raw.to_string()))
}

fn set_error_json(error: &SetError) -> Result<Value, serde_json::Error> {
    let mut out = json!({ "error": error.to_string() });
    match error {
        SetError::Validation {
            report,
            safe_fallback_available,
            ..
        } => {
            out["report"] = serde_json::to_value(report)?;
            out["safe_fallback_available"] = Value::Bool(*safe_fallback_available);
        }
        SetError::Conflict { conflicts, .. } => {
            out["conflicts"] = serde_json::to_value(conflicts)?;
        }
        SetError::UnknownKey(_) | SetError::Store(_) => {}
    }
    Ok(out)
}
