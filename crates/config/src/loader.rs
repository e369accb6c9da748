use std::path::Path;

use crate::{Config, Error};

pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse(&content)
}

pub(crate) fn parse(content: &str) -> crate::Result<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;

    if config.history.max_tool_parts_per_message > 1000 {
        log::warn!(
            "history.max_tool_parts_per_message is set to {}, corrupted histories will be replayed almost in full",
            config.history.max_tool_parts_per_message
        );
    }

    Ok(config)
}

fn validate(config: &Config) -> crate::Result<()> {
    if config.history.max_tool_parts_per_message == 0 {
        return Err(Error::InvalidValue {
            path: "history.max_tool_parts_per_message",
            reason: "must be greater than zero".to_string(),
        });
    }

    if config.images.inline_remote && config.images.max_bytes == 0 {
        return Err(Error::InvalidValue {
            path: "images.max_bytes",
            reason: "must be greater than zero when inline_remote is enabled".to_string(),
        });
    }

    if config.images.inline_remote && config.images.timeout.is_zero() {
        return Err(Error::InvalidValue {
            path: "images.timeout",
            reason: "must be greater than zero when inline_remote is enabled".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;

    use crate::Config;

    #[test]
    fn zero_tool_limit_is_rejected() {
        let config = indoc! {r#"
            [history]
            max_tool_parts_per_message = 0
        "#};

        let error = Config::from_toml(config).unwrap_err();

        insta::assert_snapshot!(error, @"Invalid value at history.max_tool_parts_per_message: must be greater than zero");
    }

    #[test]
    fn zero_image_size_is_accepted_when_inlining_is_disabled() {
        let config = indoc! {r#"
            [images]
            inline_remote = false
            max_bytes = 0
        "#};

        let config = Config::from_toml(config).unwrap();
        assert!(!config.images.inline_remote);
    }

    #[test]
    fn zero_image_size_is_rejected_when_inlining() {
        let config = indoc! {r#"
            [images]
            max_bytes = 0
        "#};

        let error = Config::from_toml(config).unwrap_err();

        insta::assert_snapshot!(error, @"Invalid value at images.max_bytes: must be greater than zero when inline_remote is enabled");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();

        writeln!(file, "[history]\nmax_tool_parts_per_message = 7").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.history.max_tool_parts_per_message, 7);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let error = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(error, crate::Error::ConfigOpen(_)));
    }
}
