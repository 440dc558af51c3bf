//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: application defaults, configuration file,
//! environment variables, command-line arguments. Layers are composed with
//! `MergeComposer` directly rather than through `OrthoConfig::load()` because
//! the CLI owns subcommand dispatch and because typed environment values
//! must fail fast instead of being silently ignored.
//!
//! Environment variables are read through `mockable::Env` so precedence can
//! be tested without touching the process environment.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{Cli, Commands, HarnessConfig};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// Always accepted.
    String,
    /// `true`/`false`.
    Bool,
    /// Unsigned integer.
    U64,
}

/// Maps one environment variable onto a configuration path.
struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "TESTPOD_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    // TLS
    EnvVarSpec {
        env_var: "TESTPOD_TLS_VERIFY",
        path: &["tls", "verify"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "TESTPOD_TLS_CERT_PATH",
        path: &["tls", "cert_path"],
        var_type: EnvVarType::String,
    },
    // Readiness
    EnvVarSpec {
        env_var: "TESTPOD_READINESS_TIMEOUT_MS",
        path: &["readiness", "timeout_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "TESTPOD_READINESS_POLL_INTERVAL_MS",
        path: &["readiness", "poll_interval_ms"],
        var_type: EnvVarType::U64,
    },
    // Pool
    EnvVarSpec {
        env_var: "TESTPOD_POOL_MAX_IDLE",
        path: &["pool", "max_idle"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "TESTPOD_POOL_MAX_ACTIVE",
        path: &["pool", "max_active"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "TESTPOD_POOL_IDLE_TIMEOUT_SECS",
        path: &["pool", "idle_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "TESTPOD_POOL_CONNECT_TIMEOUT_MS",
        path: &["pool", "connect_timeout_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "TESTPOD_POOL_WAIT_TIMEOUT_MS",
        path: &["pool", "wait_timeout_ms"],
        var_type: EnvVarType::U64,
    },
    // Service
    EnvVarSpec {
        env_var: "TESTPOD_SERVICE_IMAGE",
        path: &["service", "image"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "TESTPOD_SERVICE_PORT",
        path: &["service", "port"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "TESTPOD_SERVICE_ADDRESS",
        path: &["service", "address"],
        var_type: EnvVarType::String,
    },
];

/// Returns the environment variable names recognised by the loader.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load configuration using the process environment.
///
/// # Errors
///
/// See [`load_config_with_env`].
pub fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    load_config_with_env(cli, &mockable::DefaultEnv::new())
}

/// Load configuration with full layer precedence.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` for unreadable or malformed files,
/// `ConfigError::InvalidValue` for unparseable typed environment values, and
/// `ConfigError::OrthoConfig` when the merged layers do not deserialise.
pub fn load_config_with_env<E: mockable::Env>(cli: &Cli, env: &E) -> Result<HarnessConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(HarnessConfig::default()).map_err(|error| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {error}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(ref path) = discover_config_file(cli) {
        tracing::debug!(path = %path, "loading configuration file");
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    HarnessConfig::merge_from_layers(composer.layers())
        .map_err(|error| ConfigError::OrthoConfig(error).into())
}

/// Use the CLI-provided path when it exists, otherwise discover one.
fn discover_config_file(cli: &Cli) -> Option<Utf8PathBuf> {
    cli.config.clone().filter(|path| path.exists()).or_else(|| {
        ConfigDiscovery::builder("testpod")
            .env_var("TESTPOD_CONFIG_PATH")
            .config_file_name("config.toml")
            .dotfile_name(".testpod.toml")
            .build()
            .candidates()
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| Utf8PathBuf::try_from(path).ok())
    })
}

/// Read a TOML file through its parent directory capability.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_path());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|error| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {error}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|error| ConfigError::ParseError {
            message: format!("failed to read {path}: {error}"),
        })?;

    let value = toml::from_str::<Value>(&content).map_err(|error| ConfigError::ParseError {
        message: format!("failed to parse {path}: {error}"),
    })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Collect `TESTPOD_*` variables into a JSON value, failing on bad typed values.
fn collect_env_vars<E: mockable::Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => raw_value.parse::<bool>().map(Value::Bool).map_err(|_| {
                ConfigError::InvalidValue {
                    field: String::from(spec.env_var),
                    reason: format!("expected bool (true/false), got '{raw_value}'"),
                }
            })?,
            EnvVarType::U64 => raw_value
                .parse::<u64>()
                .map(|number| Value::Number(number.into()))
                .map_err(|_| ConfigError::InvalidValue {
                    field: String::from(spec.env_var),
                    reason: format!("expected unsigned integer, got '{raw_value}'"),
                })?,
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert `value` at a nested path, creating intermediate objects.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(String::from(segment))
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(object) = entry.as_object_mut() else {
            return;
        };
        current = object;
    }

    current.insert(String::from(field), value);
}

/// Build the CLI layer from global flags and subcommand arguments.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref socket) = cli.engine_socket {
        insert_at_path(&mut overrides, &["engine_socket"], Value::String(socket.clone()));
    }

    match &cli.command {
        Commands::Run(args) => {
            if let Some(ref image) = args.image {
                insert_at_path(&mut overrides, &["service", "image"], Value::String(image.clone()));
            }
            if let Some(ref port) = args.port {
                insert_at_path(&mut overrides, &["service", "port"], Value::String(port.clone()));
            }
        }
        Commands::Ping(args) => {
            if let Some(ref address) = args.address {
                insert_at_path(
                    &mut overrides,
                    &["service", "address"],
                    Value::String(address.clone()),
                );
            }
        }
        Commands::Check => {}
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
