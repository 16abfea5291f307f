//! Structural signatures for cache change detection.
//!
//! A signature is a canonical byte encoding of a descriptor: every string is
//! length-prefixed and every collection carries its element count, so two
//! descriptors encode equal iff they are structurally equal. Inclusion sets
//! are `BTreeSet`s and therefore encode in sorted order.
//!
//! For logging, a signature also exposes a short FNV-1a 64-bit digest. The
//! digest is only an identity aid; equality always compares the full encoding.

use crate::predicate::{Logic, ValueType};
use crate::query::{OrderDescriptor, SearchDescriptor, SortDirection};

/// Prefix used in rendered digests.
pub const SIGNATURE_DIGEST_PREFIX: &str = "fnv1a64:";

/// FNV-1a 64-bit over arbitrary bytes.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn digest(&self) -> String {
        format!("{SIGNATURE_DIGEST_PREFIX}{:016x}", fnv1a64(&self.0))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Default)]
struct Encoder(Vec<u8>);

impl Encoder {
    fn tag(&mut self, tag: u8) -> &mut Self {
        self.0.push(tag);
        self
    }

    fn len(&mut self, n: usize) -> &mut Self {
        self.0.extend_from_slice(&(n as u64).to_le_bytes());
        self
    }

    fn str(&mut self, s: &str) -> &mut Self {
        self.len(s.len());
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    fn opt_str(&mut self, s: Option<&str>) -> &mut Self {
        match s {
            Some(s) => self.tag(1).str(s),
            None => self.tag(0),
        }
    }

    fn finish(self) -> Signature {
        Signature(self.0)
    }
}

/// Signature of everything that determines the filtered subset.
pub fn search_signature(search: &SearchDescriptor, regex: bool) -> Signature {
    let mut enc = Encoder::default();
    enc.tag(b'S').tag(regex as u8);
    enc.opt_str(search.basic_text.as_deref());
    enc.tag(match search.logic {
        Logic::And => b'&',
        Logic::Or => b'|',
    });
    enc.len(search.criteria.len());
    for c in &search.criteria {
        enc.str(&c.field_path).str(&c.operator).tag(match c.value_type {
            ValueType::Num => b'n',
            ValueType::String => b's',
        });
        enc.len(c.operands.len());
        for op in &c.operands {
            enc.str(op);
        }
    }
    match &search.inclusion_set {
        Some(set) => {
            enc.tag(1).len(set.len());
            for name in set {
                enc.str(name);
            }
        }
        None => {
            enc.tag(0);
        }
    }
    enc.finish()
}

/// Signature of the requested order; `None` means record order.
pub fn order_signature(order: Option<&OrderDescriptor>) -> Signature {
    let mut enc = Encoder::default();
    enc.tag(b'O');
    match order {
        Some(o) => {
            enc.tag(1).str(&o.field_path).tag(match o.direction {
                SortDirection::Asc => b'+',
                SortDirection::Desc => b'-',
            });
        }
        None => {
            enc.tag(0);
        }
    }
    enc.finish()
}
