//! Issuer server configuration.
//!
//! Loads configuration from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax.
//!
//! # Example configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4031
//! issuer_private_key_path = "$ISSUER_PRIVATE_KEY_PATH"
//! cors_origins = ["https://vendor.example.com"]
//! ```
//!
//! # Environment variables
//!
//! - `CONFIG` — path to the configuration file (default: `config.toml`)
//! - `HOST` — override the bind address
//! - `PORT` — override the bind port
//! - `ISSUER_PRIVATE_KEY_PATH` — referenced by `$ISSUER_PRIVATE_KEY_PATH` in the config file

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level issuer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4031`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// PKCS8 PEM file holding the issuer's ECDSA P-256 private key, used
    /// only to serve `GET /issuer/keys/public`. The issuer does not sign
    /// any protocol messages with it; clients and vendors are the only
    /// principals whose signatures the issuer verifies.
    pub issuer_private_key_path: PathBuf,

    /// Origins allowed to call this server's HTTP API.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4031
}

impl IssuerConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// After loading, all string values with `$VAR` / `${VAR}` references
    /// are expanded from the process environment. `HOST` and `PORT` env
    /// vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment
/// variables. Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }

            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                if braced {
                    if c == '}' {
                        chars.next();
                        break;
                    }
                } else if !c.is_ascii_alphanumeric() && c != '_' {
                    break;
                }
                var_name.push(c);
                chars.next();
            }

            if var_name.is_empty() {
                result.push('$');
                if braced {
                    result.push('{');
                }
            } else if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            } else {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced {
                    result.push('}');
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let config: IssuerConfig = toml::from_str(r#"issuer_private_key_path = "issuer.pem""#)
            .expect("parses with defaults");
        assert_eq!(config.port, 4031);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn expands_braced_and_bare_variables() {
        std::env::set_var("TOLLGATE_TEST_VAR", "resolved");
        assert_eq!(expand_env_vars("prefix-${TOLLGATE_TEST_VAR}-suffix"), "prefix-resolved-suffix");
        assert_eq!(expand_env_vars("$TOLLGATE_TEST_VAR"), "resolved");
        std::env::remove_var("TOLLGATE_TEST_VAR");
    }

    #[test]
    fn leaves_unresolved_variables_untouched() {
        assert_eq!(expand_env_vars("$TOLLGATE_DEFINITELY_UNSET"), "$TOLLGATE_DEFINITELY_UNSET");
    }
}
