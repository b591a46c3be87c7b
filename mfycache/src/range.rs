//! Interprétation de l'en-tête HTTP `Range` (une seule plage, unité `bytes`)

use crate::error::RangeError;

/// Plage d'octets inclusive `[start, end]` d'un fichier de `size` octets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl ByteRange {
    /// Analyse `header` pour un fichier de `size` octets
    ///
    /// Formes acceptées : `bytes=S-E`, `bytes=S-` et `bytes=-N` (les N
    /// derniers octets). Une fin au-delà du fichier est refusée, pas tronquée.
    pub fn parse(header: &str, size: u64) -> Result<Self, RangeError> {
        let malformed = || RangeError::Malformed(header.to_string());
        let unsatisfiable = RangeError::Unsatisfiable { size };

        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(malformed)?
            .trim();
        if spec.contains(',') {
            return Err(malformed());
        }
        let (first, last) = spec.split_once('-').ok_or_else(malformed)?;
        let (first, last) = (first.trim(), last.trim());

        let parse_bound = |s: &str| s.parse::<u64>().map_err(|_| malformed());

        let (start, end) = match (first.is_empty(), last.is_empty()) {
            (true, true) => return Err(malformed()),
            // Suffixe : les N derniers octets
            (true, false) => {
                let suffix = parse_bound(last)?;
                if suffix == 0 || size == 0 {
                    return Err(unsatisfiable);
                }
                (size.saturating_sub(suffix), size - 1)
            }
            (false, true) => {
                let start = parse_bound(first)?;
                if start >= size {
                    return Err(unsatisfiable);
                }
                (start, size - 1)
            }
            (false, false) => {
                let start = parse_bound(first)?;
                let end = parse_bound(last)?;
                if start > end {
                    return Err(malformed());
                }
                if end >= size {
                    return Err(unsatisfiable);
                }
                (start, end)
            }
        };

        Ok(Self { start, end, size })
    }

    /// Nombre d'octets de la plage
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Valeur de l'en-tête `Content-Range` d'une réponse 206
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Valeur de l'en-tête `Content-Range` d'une réponse 416
pub fn unsatisfied_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_range() {
        let range = ByteRange::parse("bytes=0-99", 1000).unwrap();
        assert_eq!((range.start, range.end), (0, 99));
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(), "bytes 0-99/1000");
    }

    #[test]
    fn test_open_ended_range() {
        let range = ByteRange::parse("bytes=900-", 1000).unwrap();
        assert_eq!((range.start, range.end), (900, 999));
        assert_eq!(range.len(), 100);
    }

    #[test]
    fn test_suffix_range() {
        let range = ByteRange::parse("bytes=-100", 1000).unwrap();
        assert_eq!((range.start, range.end), (900, 999));

        let whole = ByteRange::parse("bytes=-5000", 1000).unwrap();
        assert_eq!((whole.start, whole.end), (0, 999));
    }

    #[test]
    fn test_out_of_bounds_is_unsatisfiable() {
        let unsatisfiable = Err(RangeError::Unsatisfiable { size: 1000 });
        assert_eq!(ByteRange::parse("bytes=2000-3000", 1000), unsatisfiable);
        assert_eq!(ByteRange::parse("bytes=0-1000", 1000), unsatisfiable);
        assert_eq!(ByteRange::parse("bytes=1000-", 1000), unsatisfiable);
        assert_eq!(ByteRange::parse("bytes=-0", 1000), unsatisfiable);
        assert_eq!(unsatisfied_content_range(1000), "bytes */1000");
    }

    #[test]
    fn test_malformed_headers() {
        for header in [
            "items=0-10",
            "bytes=",
            "bytes=-",
            "bytes=abc-10",
            "bytes=10-5",
            "bytes=0-10,20-30",
        ] {
            assert!(
                matches!(ByteRange::parse(header, 1000), Err(RangeError::Malformed(_))),
                "{header} should be malformed"
            );
        }
    }
}
