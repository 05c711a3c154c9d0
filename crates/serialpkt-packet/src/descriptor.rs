use std::fmt;

use bytes::Bytes;
use regex::bytes::Regex;
use uuid::Uuid;

use crate::error::{EvaluationError, PacketError, Result};
use crate::evaluator::Evaluator;

/// Unique identifier of a [`PacketDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(Uuid);

impl DescriptorId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a descriptor decides that buffered bytes form a complete packet.
#[derive(Clone)]
pub enum MatchRule {
    /// Fixed leading and/or trailing bytes.
    ///
    /// - both set: starts with `prefix`, ends with `suffix`, no overlap
    /// - prefix only: the buffer is exactly `prefix` (fixed sentinel)
    /// - suffix only: everything up to and including `suffix`
    PrefixSuffix {
        prefix: Option<Bytes>,
        suffix: Option<Bytes>,
    },
    /// Any buffer containing at least one match.
    Regex(Regex),
    /// Arbitrary acceptance test.
    Custom(Evaluator),
}

impl fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchRule::PrefixSuffix { prefix, suffix } => f
                .debug_struct("PrefixSuffix")
                .field("prefix", prefix)
                .field("suffix", suffix)
                .finish(),
            MatchRule::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            MatchRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Immutable definition of a packet format.
///
/// `user_info` is opaque caller data handed back with every packet matched by
/// this descriptor.
#[derive(Debug, Clone)]
pub struct PacketDescriptor<U = ()> {
    id: DescriptorId,
    rule: MatchRule,
    user_info: U,
}

impl<U> PacketDescriptor<U> {
    /// Create a descriptor from an explicit rule.
    ///
    /// Empty prefixes and suffixes count as absent; a prefix/suffix rule with
    /// neither boundary is rejected with [`PacketError::MissingBoundary`].
    pub fn new(rule: MatchRule, user_info: U) -> Result<Self> {
        let rule = match rule {
            MatchRule::PrefixSuffix { prefix, suffix } => {
                let prefix = prefix.filter(|p| !p.is_empty());
                let suffix = suffix.filter(|s| !s.is_empty());
                if prefix.is_none() && suffix.is_none() {
                    return Err(PacketError::MissingBoundary);
                }
                MatchRule::PrefixSuffix { prefix, suffix }
            }
            other => other,
        };

        Ok(Self {
            id: DescriptorId::generate(),
            rule,
            user_info,
        })
    }

    /// Packets delimited by a fixed prefix and/or suffix.
    pub fn with_prefix_suffix(
        prefix: Option<impl Into<Bytes>>,
        suffix: Option<impl Into<Bytes>>,
        user_info: U,
    ) -> Result<Self> {
        Self::new(
            MatchRule::PrefixSuffix {
                prefix: prefix.map(Into::into),
                suffix: suffix.map(Into::into),
            },
            user_info,
        )
    }

    /// Same as [`with_prefix_suffix`](Self::with_prefix_suffix) for text protocols.
    pub fn with_prefix_suffix_str(
        prefix: Option<&str>,
        suffix: Option<&str>,
        user_info: U,
    ) -> Result<Self> {
        Self::with_prefix_suffix(
            prefix.map(|p| Bytes::copy_from_slice(p.as_bytes())),
            suffix.map(|s| Bytes::copy_from_slice(s.as_bytes())),
            user_info,
        )
    }

    /// Packets recognised by a regular expression.
    ///
    /// The whole buffer at the moment of the first match is the packet, so
    /// patterns should match as little as possible.
    pub fn with_regex(pattern: &str, user_info: U) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        Self::with_compiled_regex(regex, user_info)
    }

    /// Packets recognised by a precompiled regular expression.
    pub fn with_compiled_regex(regex: Regex, user_info: U) -> Result<Self> {
        Self::new(MatchRule::Regex(regex), user_info)
    }

    /// Packets recognised by an infallible predicate.
    pub fn with_evaluator<F>(evaluator: F, user_info: U) -> Result<Self>
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        Self::new(MatchRule::Custom(Evaluator::new(evaluator)), user_info)
    }

    /// Packets recognised by a predicate that may fail.
    pub fn with_fallible_evaluator<F>(evaluator: F, user_info: U) -> Result<Self>
    where
        F: Fn(&[u8]) -> std::result::Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        Self::new(MatchRule::Custom(Evaluator::fallible(evaluator)), user_info)
    }

    /// Whether `data` is a complete packet for this descriptor.
    pub fn is_valid_packet(&self, data: &[u8]) -> Result<bool> {
        match &self.rule {
            MatchRule::PrefixSuffix { prefix, suffix } => Ok(match (prefix, suffix) {
                (Some(prefix), Some(suffix)) => {
                    data.len() >= prefix.len() + suffix.len()
                        && data.starts_with(prefix)
                        && data.ends_with(suffix)
                }
                (Some(prefix), None) => data == &prefix[..],
                (None, Some(suffix)) => data.ends_with(suffix),
                (None, None) => false,
            }),
            MatchRule::Regex(regex) => Ok(regex.is_match(data)),
            MatchRule::Custom(evaluator) => evaluator.evaluate(data).map_err(Into::into),
        }
    }

    /// Whether `data` is still consistent with the start of a packet.
    ///
    /// Only prefixed rules constrain the start; everything else returns true.
    pub fn could_start_packet(&self, data: &[u8]) -> bool {
        match self.prefix() {
            Some(prefix) => data.starts_with(prefix) || prefix.starts_with(data),
            None => true,
        }
    }

    /// Descriptor identifier.
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    /// The matching rule.
    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// Fixed prefix, for prefix/suffix descriptors.
    pub fn prefix(&self) -> Option<&[u8]> {
        match &self.rule {
            MatchRule::PrefixSuffix { prefix, .. } => prefix.as_deref(),
            _ => None,
        }
    }

    /// Fixed suffix, for prefix/suffix descriptors.
    pub fn suffix(&self) -> Option<&[u8]> {
        match &self.rule {
            MatchRule::PrefixSuffix { suffix, .. } => suffix.as_deref(),
            _ => None,
        }
    }

    /// The regular expression, for regex descriptors.
    pub fn regex(&self) -> Option<&Regex> {
        match &self.rule {
            MatchRule::Regex(regex) => Some(regex),
            _ => None,
        }
    }

    /// Caller data attached at construction.
    pub fn user_info(&self) -> &U {
        &self.user_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_and_suffix() {
        let d = PacketDescriptor::with_prefix_suffix_str(Some("$"), Some("\r\n"), ()).unwrap();
        assert!(d.is_valid_packet(b"$GPGGA,1\r\n").unwrap());
        assert!(d.is_valid_packet(b"$\r\n").unwrap());
        assert!(!d.is_valid_packet(b"GPGGA\r\n").unwrap());
        assert!(!d.is_valid_packet(b"$GPGGA").unwrap());
    }

    #[test]
    fn prefix_and_suffix_must_not_share_bytes() {
        let d = PacketDescriptor::with_prefix_suffix_str(Some("ab"), Some("ba"), ()).unwrap();
        assert!(!d.is_valid_packet(b"aba").unwrap());
        assert!(d.is_valid_packet(b"abba").unwrap());
    }

    #[test]
    fn prefix_only_is_fixed_sentinel() {
        let d = PacketDescriptor::with_prefix_suffix(Some(&b"\x06"[..]), None::<Bytes>, ())
            .unwrap();
        assert!(d.is_valid_packet(b"\x06").unwrap());
        assert!(!d.is_valid_packet(b"\x06\x06").unwrap());
        assert!(!d.is_valid_packet(b"").unwrap());
    }

    #[test]
    fn suffix_only_takes_whole_buffer() {
        let d = PacketDescriptor::with_prefix_suffix_str(None, Some("\n"), ()).unwrap();
        assert!(d.is_valid_packet(b"anything at all\n").unwrap());
        assert!(!d.is_valid_packet(b"no newline").unwrap());
    }

    #[test]
    fn missing_both_boundaries_is_rejected() {
        let err = PacketDescriptor::with_prefix_suffix_str(None, None, ()).unwrap_err();
        assert!(matches!(err, PacketError::MissingBoundary));

        let err = PacketDescriptor::with_prefix_suffix_str(Some(""), Some(""), ()).unwrap_err();
        assert!(matches!(err, PacketError::MissingBoundary));
    }

    #[test]
    fn regex_matches_anywhere() {
        let d = PacketDescriptor::with_regex(r"\d{3}", "temp").unwrap();
        assert!(d.is_valid_packet(b"xx123").unwrap());
        assert!(!d.is_valid_packet(b"xx12").unwrap());
        assert_eq!(*d.user_info(), "temp");
        assert_eq!(d.regex().map(|r| r.as_str()), Some(r"\d{3}"));
    }

    #[test]
    fn invalid_regex_is_construction_error() {
        let err = PacketDescriptor::with_regex("(unclosed", ()).unwrap_err();
        assert!(matches!(err, PacketError::InvalidRegex(_)));
    }

    #[test]
    fn custom_evaluator_sees_whole_buffer() {
        let d = PacketDescriptor::with_evaluator(|data| data.len() == 4 && data[0] == 0x7E, ())
            .unwrap();
        assert!(d.is_valid_packet(&[0x7E, 1, 2, 3]).unwrap());
        assert!(!d.is_valid_packet(&[0x7E, 1, 2]).unwrap());
        assert!(!d.is_valid_packet(&[]).unwrap());
    }

    #[test]
    fn fallible_evaluator_error_surfaces() {
        let d = PacketDescriptor::with_fallible_evaluator(
            |_| Err(EvaluationError::new("checksum table missing")),
            (),
        )
        .unwrap();
        let err = d.is_valid_packet(b"x").unwrap_err();
        assert!(matches!(err, PacketError::Evaluation(_)));
    }

    #[test]
    fn could_start_packet_tracks_prefix() {
        let d = PacketDescriptor::with_prefix_suffix_str(Some("AB"), Some(";"), ()).unwrap();
        assert!(d.could_start_packet(b""));
        assert!(d.could_start_packet(b"A"));
        assert!(d.could_start_packet(b"AB12"));
        assert!(!d.could_start_packet(b"X"));
        assert!(!d.could_start_packet(b"AX"));

        let suffix_only = PacketDescriptor::with_prefix_suffix_str(None, Some(";"), ()).unwrap();
        assert!(suffix_only.could_start_packet(b"garbage"));
    }

    #[test]
    fn ids_are_unique() {
        let a = PacketDescriptor::with_prefix_suffix_str(Some("a"), None, ()).unwrap();
        let b = PacketDescriptor::with_prefix_suffix_str(Some("a"), None, ()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn accessors_by_rule() {
        let d = PacketDescriptor::with_prefix_suffix_str(Some("<"), Some(">"), ()).unwrap();
        assert_eq!(d.prefix(), Some(&b"<"[..]));
        assert_eq!(d.suffix(), Some(&b">"[..]));
        assert!(d.regex().is_none());
        assert!(format!("{:?}", d.rule()).starts_with("PrefixSuffix"));
    }
}
