//! Local host name used as the default `host` tag.

use crate::clean::check_clean;
use crate::error::{HostError, NameRole};

/// Look up the OS host name and reduce it with [`short_hostname`].
#[cfg(unix)]
pub fn os_hostname() -> Result<String, HostError> {
    let name = nix::unistd::gethostname().map_err(|e| HostError::Lookup(e.into()))?;
    let name = name.into_string().map_err(|_| HostError::NotUtf8)?;
    short_hostname(&name)
}

#[cfg(not(unix))]
pub fn os_hostname() -> Result<String, HostError> {
    let name = std::env::var("COMPUTERNAME").map_err(|e| {
        HostError::Lookup(std::io::Error::new(std::io::ErrorKind::NotFound, e))
    })?;
    short_hostname(&name)
}

/// Lower-case the first label of `name` and validate it as a tag value.
pub fn short_hostname(name: &str) -> Result<String, HostError> {
    let short = name.split('.').next().unwrap_or_default().to_lowercase();
    check_clean(&short, NameRole::HostTag)?;
    Ok(short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_is_first_label_lowercased() {
        assert_eq!(short_hostname("Web01.prod.example.com").unwrap(), "web01");
        assert_eq!(short_hostname("db-02").unwrap(), "db-02");
    }

    #[test]
    fn invalid_short_name_rejected() {
        assert!(matches!(short_hostname(""), Err(HostError::Invalid(_))));
        assert!(matches!(short_hostname(".example.com"), Err(HostError::Invalid(_))));
        assert!(matches!(short_hostname("my host"), Err(HostError::Invalid(_))));
    }

    #[cfg(unix)]
    #[test]
    fn os_hostname_is_clean() {
        if let Ok(name) = os_hostname() {
            assert!(!name.is_empty());
            assert!(!name.contains('.'));
            assert_eq!(name, name.to_lowercase());
        }
    }
}
