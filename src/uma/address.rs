//! UMA address grammar: `[$]<user>@<domain>`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;

static USER_NAME: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^\$?[a-zA-Z0-9\-._+]+$"));
static DOMAIN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9_][a-zA-Z0-9_\-]{0,62})(\.[a-zA-Z0-9_][a-zA-Z0-9_\-]{0,62})*[._]?$")
});
static LOCALHOST_WITH_PORT: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^localhost(:[0-9]+)?$"));

fn matches(regex: &Lazy<Result<Regex, regex::Error>>, value: &str) -> Result<bool, Error> {
    let regex = regex.as_ref().map_err(|e| Error::internal(e.to_string()))?;
    Ok(regex.is_match(value))
}

/// Loopback and development hosts, reached over plain http.
pub fn is_domain_localhost(domain: &str) -> bool {
    let host = domain.split(':').next().unwrap_or(domain);
    let tld = if host.contains('.') {
        host.rsplit('.').next().unwrap_or_default()
    } else {
        ""
    };
    host == "localhost" || host == "127.0.0.1" || tld == "local" || tld == "internal"
}

/// `https`, or `http` for [`is_domain_localhost`] hosts.
pub fn scheme_for_domain(domain: &str) -> &'static str {
    if is_domain_localhost(domain) {
        "http"
    } else {
        "https"
    }
}

pub fn validate_user_name(user_name: &str) -> Result<(), Error> {
    if matches(&USER_NAME, user_name)? {
        Ok(())
    } else {
        Err(Error::invalid_input("invalid UMA user name"))
    }
}

pub fn validate_domain(domain: &str) -> Result<(), Error> {
    let host = domain.split(':').next().unwrap_or(domain);
    if matches(&DOMAIN, domain)? || matches(&LOCALHOST_WITH_PORT, domain)? || is_domain_localhost(host)
    {
        Ok(())
    } else {
        Err(Error::invalid_input("invalid VASP domain"))
    }
}

/// Splits a valid address into its user part (with any `$`) and domain.
pub fn split_uma_address(address: &str) -> Result<(&str, &str), Error> {
    let mut parts = address.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(domain), None) => Ok((user, domain)),
        _ => Err(Error::invalid_input("invalid receiver address")),
    }
}

pub fn validate_uma_address(address: &str) -> Result<(), Error> {
    let (user, domain) = split_uma_address(address)?;
    validate_user_name(user)?;
    validate_domain(domain)
}

pub fn get_vasp_domain_from_uma_address(address: &str) -> Result<String, Error> {
    let (_, domain) = split_uma_address(address)?;
    Ok(domain.to_string())
}

/// Whether the address asks for the UMA flow rather than plain LNURL.
pub fn is_uma_address(address: &str) -> bool {
    address.starts_with('$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_uma_address() {
        assert!(validate_uma_address("$alice@vasp.example.com").is_ok());
        assert!(validate_uma_address("bob.smith+tips@vasp-2.example").is_ok());
        assert!(validate_uma_address("$alice@localhost:8080").is_ok());
        assert!(validate_uma_address("$alice@127.0.0.1:8080").is_ok());

        assert!(validate_uma_address("alice").is_err());
        assert!(validate_uma_address("$al ice@vasp.example.com").is_err());
        assert!(validate_uma_address("$alice@vasp@example.com").is_err());
        assert!(validate_uma_address("$alice@bad domain.com").is_err());
        assert!(validate_uma_address("a$lice@vasp.example.com").is_err());
    }

    #[test]
    fn test_is_domain_localhost() {
        assert!(is_domain_localhost("localhost"));
        assert!(is_domain_localhost("localhost:8080"));
        assert!(is_domain_localhost("127.0.0.1:443"));
        assert!(is_domain_localhost("vasp.local"));
        assert!(is_domain_localhost("vasp.cluster.internal:9000"));
        assert!(!is_domain_localhost("vasp.example.com"));
        assert!(!is_domain_localhost("local"));
        assert_eq!(scheme_for_domain("localhost:8080"), "http");
        assert_eq!(scheme_for_domain("vasp.example.com"), "https");
    }

    #[test]
    fn test_get_vasp_domain() {
        assert_eq!(
            get_vasp_domain_from_uma_address("$alice@vasp.example.com:8443").unwrap(),
            "vasp.example.com:8443"
        );
        assert!(is_uma_address("$alice@vasp.example.com"));
        assert!(!is_uma_address("alice@vasp.example.com"));
    }
}
