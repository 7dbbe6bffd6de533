//! Deterministic call fingerprints.
//!
//! A fingerprint is the SHA-256 of the function identity, the positional
//! arguments in order and the keyword arguments sorted by name. Every item is
//! tagged and length-prefixed before hashing so `(1, 2)` and `(12,)` differ
//! even when the codec output would concatenate to the same bytes.

use crate::codec::{encode_argument, ArgumentBytes, PayloadCodec};
use crate::identity::FunctionIdentity;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};

pub const FINGERPRINT_HEX_LEN: usize = 64;

const TAG_IDENTITY: u8 = b'f';
const TAG_POSITIONAL: u8 = b'p';
const TAG_KEYWORD: u8 = b'k';
const TAG_STRUCTURED: u8 = b's';
const TAG_LOSSY: u8 = b't';

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Accepts exactly 64 lowercase hex characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == FINGERPRINT_HEX_LEN
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects call arguments for hashing.
pub struct FingerprintBuilder<'c, C> {
    codec: &'c C,
    positional: Vec<ArgumentBytes>,
    keyword: BTreeMap<String, ArgumentBytes>,
}

impl<'c, C: PayloadCodec> FingerprintBuilder<'c, C> {
    pub fn new(codec: &'c C) -> Self {
        Self {
            codec,
            positional: Vec::new(),
            keyword: BTreeMap::new(),
        }
    }

    pub fn positional<T: Serialize + Debug + ?Sized>(&mut self, value: &T) -> &mut Self {
        self.positional.push(encode_argument(self.codec, value));
        self
    }

    /// Keyword order is irrelevant; a repeated name keeps the last value.
    pub fn keyword<T: Serialize + Debug + ?Sized>(&mut self, name: &str, value: &T) -> &mut Self {
        self.keyword
            .insert(name.to_string(), encode_argument(self.codec, value));
        self
    }

    pub fn finish(self, identity: &FunctionIdentity) -> FingerprintOutcome {
        let mut digest = Sha256::new();
        feed(&mut digest, TAG_IDENTITY, identity.fingerprint_name().as_bytes());
        let mut lossy_arguments = 0;
        for argument in &self.positional {
            digest.update([TAG_POSITIONAL]);
            lossy_arguments += feed_argument(&mut digest, argument);
        }
        for (name, argument) in &self.keyword {
            feed(&mut digest, TAG_KEYWORD, name.as_bytes());
            lossy_arguments += feed_argument(&mut digest, argument);
        }
        let bytes = digest.finalize();
        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        FingerprintOutcome {
            fingerprint: Fingerprint(out),
            lossy_arguments,
        }
    }
}

fn feed(digest: &mut Sha256, tag: u8, bytes: &[u8]) {
    digest.update([tag]);
    digest.update((bytes.len() as u64).to_le_bytes());
    digest.update(bytes);
}

fn feed_argument(digest: &mut Sha256, argument: &ArgumentBytes) -> usize {
    match argument {
        ArgumentBytes::Structured(bytes) => {
            feed(digest, TAG_STRUCTURED, bytes);
            0
        }
        ArgumentBytes::LossyText(text) => {
            feed(digest, TAG_LOSSY, text.as_bytes());
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintOutcome {
    pub fingerprint: Fingerprint,
    /// Arguments hashed from their `Debug` text instead of the codec.
    pub lossy_arguments: usize,
}

/// Arguments of one intercepted call.
pub trait CallArgs {
    fn describe<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>);
}

pub trait PositionalArgs {
    fn describe_positional<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>);
}

pub trait KeywordArgs {
    fn describe_keywords<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>);
}

/// Positional arguments `P` plus keyword arguments `K`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Args<P, K = ()> {
    pub positional: P,
    pub keyword: K,
}

impl<P> Args<P, ()> {
    pub fn new(positional: P) -> Self {
        Self {
            positional,
            keyword: (),
        }
    }
}

impl<P, K> Args<P, K> {
    pub fn with_keywords<K2>(self, keyword: K2) -> Args<P, K2> {
        Args {
            positional: self.positional,
            keyword,
        }
    }
}

impl<P: PositionalArgs, K: KeywordArgs> CallArgs for Args<P, K> {
    fn describe<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>) {
        self.positional.describe_positional(builder);
        self.keyword.describe_keywords(builder);
    }
}

impl<P: PositionalArgs> CallArgs for P {
    fn describe<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>) {
        self.describe_positional(builder);
    }
}

impl PositionalArgs for () {
    fn describe_positional<C: PayloadCodec>(&self, _builder: &mut FingerprintBuilder<'_, C>) {}
}

impl<T: Serialize + Debug> PositionalArgs for Vec<T> {
    fn describe_positional<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>) {
        for value in self {
            builder.positional(value);
        }
    }
}

macro_rules! positional_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Serialize + Debug),+> PositionalArgs for ($($name,)+) {
            fn describe_positional<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>) {
                $(builder.positional(&self.$idx);)+
            }
        }
    };
}

positional_tuple!(A: 0);
positional_tuple!(A: 0, B: 1);
positional_tuple!(A: 0, B: 1, D: 2);
positional_tuple!(A: 0, B: 1, D: 2, E: 3);
positional_tuple!(A: 0, B: 1, D: 2, E: 3, F: 4);
positional_tuple!(A: 0, B: 1, D: 2, E: 3, F: 4, G: 5);

impl KeywordArgs for () {
    fn describe_keywords<C: PayloadCodec>(&self, _builder: &mut FingerprintBuilder<'_, C>) {}
}

impl<V: Serialize + Debug> KeywordArgs for BTreeMap<String, V> {
    fn describe_keywords<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>) {
        for (name, value) in self {
            builder.keyword(name, value);
        }
    }
}

impl<V: Serialize + Debug, S> KeywordArgs for HashMap<String, V, S> {
    fn describe_keywords<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>) {
        for (name, value) in self {
            builder.keyword(name, value);
        }
    }
}

macro_rules! keyword_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Serialize + Debug),+> KeywordArgs for ($((&'static str, $name),)+) {
            fn describe_keywords<C: PayloadCodec>(&self, builder: &mut FingerprintBuilder<'_, C>) {
                $(builder.keyword(self.$idx.0, &self.$idx.1);)+
            }
        }
    };
}

keyword_tuple!(A: 0);
keyword_tuple!(A: 0, B: 1);
keyword_tuple!(A: 0, B: 1, D: 2);
keyword_tuple!(A: 0, B: 1, D: 2, E: 3);

pub fn fingerprint<C: PayloadCodec, A: CallArgs + ?Sized>(
    codec: &C,
    identity: &FunctionIdentity,
    args: &A,
) -> FingerprintOutcome {
    let mut builder = FingerprintBuilder::new(codec);
    args.describe(&mut builder);
    builder.finish(identity)
}
