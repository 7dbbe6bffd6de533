//! Call interception: the [`Mimic`] registry and the wrappers it hands out.
//!
//! A registry is created at run start, passed by reference to every place
//! that wraps a callable, and dropped at run end. Wrapping happens once at
//! setup time; callers then use the returned wrapper instead of the original
//! function.
//!
//! Per call the wrapper computes a fingerprint and then:
//! - replays the stored result if the vault has one,
//! - fails with [`MimicError::MissingRecording`] in replay-only mode,
//! - otherwise runs the original, checks the arguments were not mutated,
//!   stores the encoded result and returns it.

use crate::codec::{JsonCodec, PayloadCodec};
use crate::errors::MimicError;
use crate::fingerprint::{fingerprint, CallArgs, Fingerprint};
use crate::identity::{CallableKind, FunctionIdentity};
use crate::logging::{JsonlLogger, LogEvent};
use crate::mode::ModeSwitch;
use crate::runtime::FileSystem;
use crate::store::RecordingStore;
use crate::usage::UsageTracker;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptOptions {
    /// Silences the warning for [`CallableKind::TypeScoped`] callables, whose
    /// effect on type-level state cannot be checked.
    pub acknowledge_type_state: bool,
}

/// Error from [`Mimicked::try_call`]: either the vault or the original call.
#[derive(Debug)]
pub enum CallError<E> {
    Mimic(MimicError),
    Call(E),
}

impl<E> From<MimicError> for CallError<E> {
    fn from(value: MimicError) -> Self {
        Self::Mimic(value)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mimic(err) => write!(f, "{err}"),
            Self::Call(err) => write!(f, "{err}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CallError<E> {}

enum Lookup<R> {
    Replayed(R),
    Record,
}

pub struct Mimic<C = JsonCodec> {
    store: RecordingStore,
    codec: C,
    mode: ModeSwitch,
    usage: UsageTracker,
    logger: Option<JsonlLogger>,
    warnings: Mutex<Vec<String>>,
}

impl Mimic<JsonCodec> {
    pub fn new(fs: Arc<dyn FileSystem>, vault: impl Into<PathBuf>, mode: ModeSwitch) -> Self {
        Self::with_codec(fs, vault, mode, JsonCodec)
    }
}

impl<C: PayloadCodec> Mimic<C> {
    pub fn with_codec(
        fs: Arc<dyn FileSystem>,
        vault: impl Into<PathBuf>,
        mode: ModeSwitch,
        codec: C,
    ) -> Self {
        let store = RecordingStore::new(fs, vault, codec.extension());
        Self {
            store,
            codec,
            mode,
            usage: UsageTracker::new(),
            logger: None,
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_logger(mut self, logger: JsonlLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn mode(&self) -> &ModeSwitch {
        &self.mode
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn set_recording(&self, recording: bool) {
        self.mode.set_recording(recording);
    }

    pub fn is_recording(&self) -> bool {
        self.mode.is_recording()
    }

    /// Interception warnings issued so far (type-scoped callables).
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn fingerprint<A: CallArgs + ?Sized>(
        &self,
        identity: &FunctionIdentity,
        args: &A,
    ) -> Fingerprint {
        let outcome = fingerprint(&self.codec, identity, args);
        if outcome.lossy_arguments > 0 {
            self.log(
                "warn",
                "lossy_fingerprint",
                json!({
                    "function": identity.display_name(),
                    "fingerprint": outcome.fingerprint.as_str(),
                    "lossy_arguments": outcome.lossy_arguments,
                }),
            );
        }
        outcome.fingerprint
    }

    /// Removes every recording and the vault directory.
    pub fn clear_vault(&self) -> Result<usize, MimicError> {
        let removed = self.store.clear_all()?;
        self.log(
            "info",
            "vault_cleared",
            json!({ "vault": self.store.vault().display().to_string(), "removed": removed }),
        );
        Ok(removed)
    }

    pub fn intercept<F>(
        &self,
        identity: FunctionIdentity,
        func: F,
    ) -> Result<Mimicked<'_, C, F>, MimicError> {
        self.intercept_with(identity, func, InterceptOptions::default())
    }

    pub fn intercept_with<F>(
        &self,
        identity: FunctionIdentity,
        func: F,
        options: InterceptOptions,
    ) -> Result<Mimicked<'_, C, F>, MimicError> {
        self.check_interceptable(&identity, options)?;
        Ok(Mimicked {
            mimic: self,
            identity,
            func,
        })
    }

    pub fn intercept_async<F>(
        &self,
        identity: FunctionIdentity,
        func: F,
    ) -> Result<MimickedAsync<'_, C, F>, MimicError> {
        self.intercept_async_with(identity, func, InterceptOptions::default())
    }

    pub fn intercept_async_with<F>(
        &self,
        identity: FunctionIdentity,
        func: F,
        options: InterceptOptions,
    ) -> Result<MimickedAsync<'_, C, F>, MimicError> {
        self.check_interceptable(&identity, options)?;
        Ok(MimickedAsync {
            mimic: self,
            identity,
            func,
        })
    }

    fn check_interceptable(
        &self,
        identity: &FunctionIdentity,
        options: InterceptOptions,
    ) -> Result<(), MimicError> {
        match identity.kind {
            CallableKind::BoundInstance => Err(MimicError::UnsafeInterception(format!(
                "{identity} is bound to a live value; intercept the associated function \
                 through its type instead"
            ))),
            CallableKind::TypeScoped if !options.acknowledge_type_state => {
                let warning = format!(
                    "mimicking {identity}: changes it makes to type-level state cannot be \
                     detected; set `acknowledge_type_state` if it leaves such state untouched"
                );
                self.log(
                    "warn",
                    "type_state_warning",
                    json!({ "function": identity.display_name() }),
                );
                self.warnings
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(warning);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn lookup<R: DeserializeOwned>(
        &self,
        identity: &FunctionIdentity,
        key: &Fingerprint,
    ) -> Result<Lookup<R>, MimicError> {
        self.usage.mark_used(key);
        if self.store.exists(key) {
            let bytes = self.store.read(key)?;
            let value = self.codec.decode(&bytes).map_err(|e| {
                MimicError::Persistence(format!("decode recording {key} for {identity}: {e}"))
            })?;
            self.log(
                "debug",
                "replay",
                json!({ "function": identity.display_name(), "fingerprint": key.as_str() }),
            );
            return Ok(Lookup::Replayed(value));
        }
        if !self.mode.is_recording() {
            self.log(
                "error",
                "missing_recording",
                json!({ "function": identity.display_name(), "fingerprint": key.as_str() }),
            );
            return Err(MimicError::MissingRecording {
                function: identity.display_name(),
                fingerprint: key.to_string(),
            });
        }
        Ok(Lookup::Record)
    }

    fn persist<A: CallArgs + ?Sized, R: Serialize>(
        &self,
        identity: &FunctionIdentity,
        key: &Fingerprint,
        args: &A,
        result: &R,
    ) -> Result<(), MimicError> {
        let after = self.fingerprint(identity, args);
        if &after != key {
            self.log(
                "error",
                "mutated_input",
                json!({
                    "function": identity.display_name(),
                    "before": key.as_str(),
                    "after": after.as_str(),
                }),
            );
            return Err(MimicError::MutatedInput {
                function: identity.display_name(),
            });
        }
        let bytes = self.codec.encode(result).map_err(|e| {
            MimicError::Persistence(format!("encode result of {identity}: {e}"))
        })?;
        self.store.write(key, &bytes)?;
        self.usage.mark_used(key);
        self.log(
            "debug",
            "record",
            json!({
                "function": identity.display_name(),
                "fingerprint": key.as_str(),
                "path": self.store.path_for(key).display().to_string(),
            }),
        );
        Ok(())
    }

    pub(crate) fn log(&self, level: &str, event_type: &str, payload: Value) {
        if let Some(logger) = &self.logger {
            let _ = logger.append(&LogEvent {
                level,
                event_type,
                payload,
            });
        }
    }
}

/// Synchronous wrapper returned by [`Mimic::intercept`].
pub struct Mimicked<'m, C, F> {
    mimic: &'m Mimic<C>,
    identity: FunctionIdentity,
    func: F,
}

impl<'m, C: PayloadCodec, F> Mimicked<'m, C, F> {
    pub fn identity(&self) -> &FunctionIdentity {
        &self.identity
    }

    pub fn call<A, R>(&self, args: &mut A) -> Result<R, MimicError>
    where
        F: Fn(&mut A) -> R,
        A: CallArgs,
        R: Serialize + DeserializeOwned,
    {
        let key = self.mimic.fingerprint(&self.identity, &*args);
        if let Lookup::Replayed(value) = self.mimic.lookup::<R>(&self.identity, &key)? {
            return Ok(value);
        }
        let result = (self.func)(args);
        self.mimic.persist(&self.identity, &key, &*args, &result)?;
        Ok(result)
    }

    /// Like [`Self::call`] for fallible originals. An `Err` from the original
    /// is returned as [`CallError::Call`] and nothing is recorded.
    pub fn try_call<A, T, E>(&self, args: &mut A) -> Result<T, CallError<E>>
    where
        F: Fn(&mut A) -> Result<T, E>,
        A: CallArgs,
        T: Serialize + DeserializeOwned,
    {
        let key = self.mimic.fingerprint(&self.identity, &*args);
        if let Lookup::Replayed(value) = self.mimic.lookup::<T>(&self.identity, &key)? {
            return Ok(value);
        }
        let result = (self.func)(args).map_err(CallError::Call)?;
        self.mimic.persist(&self.identity, &key, &*args, &result)?;
        Ok(result)
    }
}

/// Asynchronous wrapper returned by [`Mimic::intercept_async`].
///
/// The only suspension point is the original call while recording. Dropping
/// the returned future before it completes writes nothing.
pub struct MimickedAsync<'m, C, F> {
    mimic: &'m Mimic<C>,
    identity: FunctionIdentity,
    func: F,
}

impl<'m, C: PayloadCodec, F> MimickedAsync<'m, C, F> {
    pub fn identity(&self) -> &FunctionIdentity {
        &self.identity
    }

    pub async fn call<A, R>(&self, args: &mut A) -> Result<R, MimicError>
    where
        F: for<'a> Fn(&'a mut A) -> BoxFuture<'a, R>,
        A: CallArgs,
        R: Serialize + DeserializeOwned,
    {
        let key = self.mimic.fingerprint(&self.identity, &*args);
        if let Lookup::Replayed(value) = self.mimic.lookup::<R>(&self.identity, &key)? {
            return Ok(value);
        }
        let result = (self.func)(&mut *args).await;
        self.mimic.persist(&self.identity, &key, &*args, &result)?;
        Ok(result)
    }

    pub async fn try_call<A, T, E>(&self, args: &mut A) -> Result<T, CallError<E>>
    where
        F: for<'a> Fn(&'a mut A) -> BoxFuture<'a, Result<T, E>>,
        A: CallArgs,
        T: Serialize + DeserializeOwned,
    {
        let key = self.mimic.fingerprint(&self.identity, &*args);
        if let Lookup::Replayed(value) = self.mimic.lookup::<T>(&self.identity, &key)? {
            return Ok(value);
        }
        let result = (self.func)(&mut *args).await.map_err(CallError::Call)?;
        self.mimic.persist(&self.identity, &key, &*args, &result)?;
        Ok(result)
    }
}
