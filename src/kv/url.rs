//! KV backend URL parsing.
//!
//! Supported forms:
//!   - `memory://`
//!   - `redis://[:password@]host:port[/db]` (default port 6379, db 0)
//!   - `rocksdb://path` (compile-time `rocksdb` feature)

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedKvUrl {
    Memory,
    Redis {
        host: String,
        port: u16,
        password: Option<String>,
        db: i64,
    },
    RocksDb {
        path: String,
    },
}

impl ParsedKvUrl {
    pub fn scheme(&self) -> &'static str {
        match self {
            ParsedKvUrl::Memory => "memory",
            ParsedKvUrl::Redis { .. } => "redis",
            ParsedKvUrl::RocksDb { .. } => "rocksdb",
        }
    }
}

pub fn parse_kv_url(raw: &str) -> Result<ParsedKvUrl, GatewayError> {
    if raw.strip_prefix("memory://").is_some() {
        return Ok(ParsedKvUrl::Memory);
    }
    if let Some(rest) = raw.strip_prefix("rocksdb://") {
        if rest.is_empty() {
            return Err(GatewayError::InvalidUrl(
                "rocksdb path is required".to_string(),
            ));
        }
        return Ok(ParsedKvUrl::RocksDb {
            path: rest.to_string(),
        });
    }

    let url = url::Url::parse(raw).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "redis" => {
            let db = match url.path().trim_start_matches('/') {
                "" => 0,
                path => path
                    .parse()
                    .map_err(|_| GatewayError::InvalidUrl(format!("invalid database number: {path}")))?,
            };
            Ok(ParsedKvUrl::Redis {
                host: url.host_str().unwrap_or_default().to_string(),
                port: url.port().unwrap_or(6379),
                password: url.password().map(str::to_string),
                db,
            })
        }
        other => Err(GatewayError::UnsupportedScheme {
            family: "KV",
            scheme: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory() {
        assert_eq!(parse_kv_url("memory://").unwrap(), ParsedKvUrl::Memory);
    }

    #[test]
    fn parses_redis_with_defaults() {
        assert_eq!(
            parse_kv_url("redis://cache.internal").unwrap(),
            ParsedKvUrl::Redis {
                host: "cache.internal".to_string(),
                port: 6379,
                password: None,
                db: 0,
            }
        );
    }

    #[test]
    fn parses_redis_with_password_and_db() {
        assert_eq!(
            parse_kv_url("redis://:hunter2@localhost:6380/3").unwrap(),
            ParsedKvUrl::Redis {
                host: "localhost".to_string(),
                port: 6380,
                password: Some("hunter2".to_string()),
                db: 3,
            }
        );
    }

    #[test]
    fn rejects_bad_db_number() {
        assert!(parse_kv_url("redis://localhost/abc").is_err());
    }

    #[test]
    fn parses_rocksdb_path() {
        assert_eq!(
            parse_kv_url("rocksdb:///var/lib/kv").unwrap(),
            ParsedKvUrl::RocksDb {
                path: "/var/lib/kv".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(matches!(
            parse_kv_url("etcd://localhost").unwrap_err(),
            GatewayError::UnsupportedScheme { .. }
        ));
    }
}
