use thiserror::Error;

/// A resource-quantity string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resource quantity {0:?}")]
pub struct InvalidQuantity(pub String);

// Binary suffixes must be checked before decimal ones so "Mi" never
// half-matches as "M" plus garbage.
const BINARY_UNITS: &[(&str, i64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
];

// Kubernetes decimal suffixes: lowercase k for kilo, uppercase for the rest.
const DECIMAL_UNITS: &[(&str, i64)] = &[
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parse a CPU quantity into cores. `"250m"` is 0.25 cores, anything else
/// is a plain decimal number of cores.
pub fn parse_cpu(q: &str) -> Result<f64, InvalidQuantity> {
    let q = q.trim();
    if let Some(milli) = q.strip_suffix('m') {
        let n: i64 = milli.parse().map_err(|_| InvalidQuantity(q.to_string()))?;
        return Ok(n as f64 / 1000.0);
    }
    match q.parse::<f64>() {
        Ok(cores) if cores.is_finite() => Ok(cores),
        _ => Err(InvalidQuantity(q.to_string())),
    }
}

/// Parse a memory quantity into bytes. Suffix matching is case-sensitive:
/// `Ki`/`Mi`/... are powers of 1024, `k`/`M`/... powers of 1000. A value
/// without a recognized suffix is a plain byte count.
pub fn parse_memory(q: &str) -> Result<i64, InvalidQuantity> {
    let q = q.trim();
    for (suffix, multiplier) in BINARY_UNITS.iter().chain(DECIMAL_UNITS) {
        if let Some(number) = q.strip_suffix(suffix) {
            let n: i64 = number.parse().map_err(|_| InvalidQuantity(q.to_string()))?;
            return Ok(n * multiplier);
        }
    }
    if let Ok(n) = q.parse::<i64>() {
        return Ok(n);
    }
    match q.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v as i64),
        _ => Err(InvalidQuantity(q.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_millicores() {
        assert_eq!(parse_cpu("250m"), Ok(0.25));
        assert_eq!(parse_cpu("100m"), Ok(0.1));
        assert_eq!(parse_cpu("1500m"), Ok(1.5));
        assert_eq!(parse_cpu("0m"), Ok(0.0));
    }

    #[test]
    fn cpu_cores() {
        assert_eq!(parse_cpu("2"), Ok(2.0));
        assert_eq!(parse_cpu("0.5"), Ok(0.5));
        assert_eq!(parse_cpu("  4  "), Ok(4.0));
    }

    #[test]
    fn cpu_invalid() {
        assert_eq!(parse_cpu(""), Err(InvalidQuantity("".to_string())));
        assert_eq!(parse_cpu("abc"), Err(InvalidQuantity("abc".to_string())));
        // fractional millicores are not a thing
        assert!(parse_cpu("1.5m").is_err());
    }

    #[test]
    fn memory_binary_suffixes() {
        assert_eq!(parse_memory("1Ki"), Ok(1024));
        assert_eq!(parse_memory("512Mi"), Ok(536_870_912));
        assert_eq!(parse_memory("2Gi"), Ok(2_147_483_648));
        assert_eq!(parse_memory("1Ti"), Ok(1_i64 << 40));
        assert_eq!(parse_memory("1Pi"), Ok(1_i64 << 50));
        assert_eq!(parse_memory("1Ei"), Ok(1_i64 << 60));
    }

    #[test]
    fn memory_decimal_suffixes() {
        assert_eq!(parse_memory("1k"), Ok(1_000));
        assert_eq!(parse_memory("3M"), Ok(3_000_000));
        assert_eq!(parse_memory("2G"), Ok(2_000_000_000));
        assert_eq!(parse_memory("1T"), Ok(1_000_000_000_000));
        assert_eq!(parse_memory("1P"), Ok(1_000_000_000_000_000));
        assert_eq!(parse_memory("1E"), Ok(1_000_000_000_000_000_000));
    }

    #[test]
    fn memory_suffixes_are_case_sensitive() {
        // uppercase K and lowercase "mi" are not Kubernetes units
        assert!(parse_memory("1K").is_err());
        assert!(parse_memory("1mi").is_err());
    }

    #[test]
    fn memory_plain_bytes() {
        assert_eq!(parse_memory("1024"), Ok(1024));
        assert_eq!(parse_memory("0"), Ok(0));
        assert_eq!(parse_memory("1e3"), Ok(1000));
    }

    #[test]
    fn memory_invalid() {
        assert_eq!(parse_memory("x"), Err(InvalidQuantity("x".to_string())));
        assert!(parse_memory("Gi").is_err());
        assert!(parse_memory("12Qx").is_err());
    }
}
