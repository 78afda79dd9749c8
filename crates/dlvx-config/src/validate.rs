use crate::config::Config;
use crate::error::ConfigError;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !is_host_port(&config.backend.address) {
        errors.push(ConfigError::Validation {
            field: "backend.address".to_string(),
            message: format!("must be host:port, got {:?}", config.backend.address),
        });
    }

    if config.backend.connect_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            field: "backend.connect_timeout_secs".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    if !(1..=600).contains(&config.backend.request_timeout_secs) {
        errors.push(ConfigError::Validation {
            field: "backend.request_timeout_secs".to_string(),
            message: format!(
                "must be 1\u{2013}600, got {}",
                config.backend.request_timeout_secs
            ),
        });
    }

    if !(1..=1024).contains(&config.session.stack_depth) {
        errors.push(ConfigError::Validation {
            field: "session.stack_depth".to_string(),
            message: format!("must be 1\u{2013}1024, got {}", config.session.stack_depth),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a non-empty host and a numeric port.
fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_default_config_passes() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn empty_address_rejected() {
        let mut cfg = Config::default();
        cfg.backend.address = String::new();
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(format!("{}", errs[0]).contains("backend.address"));
    }

    #[test]
    fn address_without_port_rejected() {
        let mut cfg = Config::default();
        cfg.backend.address = "localhost".into();
        assert!(validate(&cfg).is_err());
        cfg.backend.address = "localhost:http".into();
        assert!(validate(&cfg).is_err());
        cfg.backend.address = ":2345".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn hostname_address_allowed() {
        let mut cfg = Config::default();
        cfg.backend.address = "dlv.internal:40000".into();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn request_timeout_bounds() {
        let mut cfg = Config::default();
        cfg.backend.request_timeout_secs = 0;
        assert!(validate(&cfg).is_err());
        cfg.backend.request_timeout_secs = 601;
        assert!(validate(&cfg).is_err());
        cfg.backend.request_timeout_secs = 600;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn zero_connect_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.backend.connect_timeout_secs = 0;
        let errs = validate(&cfg).unwrap_err();
        assert!(format!("{}", errs[0]).contains("backend.connect_timeout_secs"));
    }

    #[test]
    fn multiple_errors_returned() {
        let mut cfg = Config::default();
        cfg.backend.address = String::new();
        cfg.backend.request_timeout_secs = 0;
        cfg.session.stack_depth = 0;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(errs.len(), 3);
    }
}
