//! Small helpers shared across components: logger setup, data-dir resolution,
//! and the TOML config parse-with-default pattern used by [`crate::node::config::NodeConfig`].

use std::{collections::HashMap, io, path::PathBuf, str::FromStr, sync::Once};

static INIT: Once = Once::new();

/// Sets up the process-wide logger. Safe to call multiple times.
pub fn setup_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(
            env_logger::Env::default()
                .default_filter_or("otcswap=info")
                .default_write_style_or("always"),
        )
        .init();
    });
}

/// Root data directory for the node, honoring `STATE_DIR` (spec.md 6) before
/// falling back to the platform data directory.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".otcswap")
        .join("node")
}

/// Parses a flat `key = value` TOML file into a string map, tolerating a
/// missing or empty file (the caller then falls back to defaults).
pub fn parse_toml(path: &std::path::Path) -> io::Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    if !path.exists() {
        return Ok(map);
    }
    let contents = std::fs::read_to_string(path)?;
    let parsed: toml::Value = match contents.parse() {
        Ok(v) => v,
        Err(_) => return Ok(map),
    };
    if let toml::Value::Table(table) = parsed {
        for (k, v) in table {
            let s = match v {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            map.insert(k, s);
        }
    }
    Ok(map)
}

/// Parses a single config field out of the raw string map, falling back to
/// `default` on a missing key or a parse failure — the same forgiving
/// behavior the teacher's `MakerConfig`/`TakerConfig` rely on so a partial or
/// malformed config file never prevents startup.
pub fn parse_field<T: FromStr + Clone>(raw: Option<&String>, default: T) -> T {
    match raw {
        Some(s) => s.parse().unwrap_or(default),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_field_falls_back_on_missing_or_bad_value() {
        let mut map = HashMap::new();
        map.insert("port".to_string(), "not_a_number".to_string());
        assert_eq!(parse_field::<u16>(map.get("port"), 9000), 9000);
        assert_eq!(parse_field::<u16>(None, 9000), 9000);
        map.insert("port".to_string(), "9100".to_string());
        assert_eq!(parse_field::<u16>(map.get("port"), 9000), 9100);
    }

    #[test]
    fn parse_toml_tolerates_missing_file() {
        let path = std::path::PathBuf::from("/nonexistent/otcswap-test-config.toml");
        let map = parse_toml(&path).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn parse_toml_reads_flat_table() {
        let dir = std::env::temp_dir();
        let path = dir.join("otcswap_utill_test_config.toml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "port = 9101").unwrap();
            writeln!(f, "bootstrap_peer = \"127.0.0.1:9000\"").unwrap();
        }
        let map = parse_toml(&path).unwrap();
        assert_eq!(map.get("port").unwrap(), "9101");
        assert_eq!(map.get("bootstrap_peer").unwrap(), "127.0.0.1:9000");
        std::fs::remove_file(&path).unwrap();
    }
}
