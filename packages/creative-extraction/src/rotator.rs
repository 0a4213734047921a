//! Credential rotation with per-key usage thresholds.
//!
//! Each credential may be used `threshold` times before it is parked for
//! `cooldown`. `acquire` hands out a usable credential, preferring the one
//! exhausted least recently, and waits for the soonest cooldown to expire
//! when every credential is parked.

use std::fmt;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::security::SecretString;

/// Rotation settings.
#[derive(Debug, Clone)]
pub struct RotatorConfig {
    /// Uses before a credential cools down. Default: 15.
    pub threshold: u32,

    /// How long an exhausted credential is parked. Default: 60 seconds.
    pub cooldown: Duration,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            threshold: 15,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl RotatorConfig {
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(PipelineError::Config("key threshold must be at least 1".into()));
        }
        if self.cooldown.is_zero() {
            return Err(PipelineError::Config("key cooldown must be positive".into()));
        }
        Ok(())
    }
}

/// A provider key handed out by the rotator.
#[derive(Clone)]
pub struct Credential {
    slot: usize,
    id: String,
    secret: SecretString,
}

impl Credential {
    pub fn new(id: impl Into<String>, secret: impl Into<SecretString>) -> Self {
        Self {
            slot: 0,
            id: id.into(),
            secret: secret.into(),
        }
    }

    /// Label safe to log.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.id == other.id
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

struct Slot {
    credential: Credential,
    used: u32,
    cooldown_until: Option<Instant>,
    last_exhausted: Option<Instant>,
}

impl Slot {
    fn usable_at(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| until <= now)
    }
}

/// Point-in-time view of one credential, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialState {
    pub id: String,
    pub used: u32,
    pub cooling_down: bool,
}

/// Shared, mutex-guarded pool of provider credentials.
pub struct KeyRotator {
    slots: Mutex<Vec<Slot>>,
    config: RotatorConfig,
}

impl fmt::Debug for KeyRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRotator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KeyRotator {
    /// Build a rotator. Fails on an empty pool or invalid config.
    pub fn new(credentials: Vec<Credential>, config: RotatorConfig) -> Result<Self> {
        config.validate()?;
        if credentials.is_empty() {
            return Err(PipelineError::Config("at least one credential is required".into()));
        }

        let slots = credentials
            .into_iter()
            .enumerate()
            .map(|(slot, mut credential)| {
                credential.slot = slot;
                Slot {
                    credential,
                    used: 0,
                    cooldown_until: None,
                    last_exhausted: None,
                }
            })
            .collect();

        Ok(Self {
            slots: Mutex::new(slots),
            config,
        })
    }

    /// Build a rotator from raw keys, labelled `key-0`, `key-1`, ...
    pub fn from_keys<I, S>(keys: I, config: RotatorConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| {
                let key: String = key.into();
                Credential::new(format!("key-{i}"), key)
            })
            .collect();
        Self::new(credentials, config)
    }

    pub fn config(&self) -> &RotatorConfig {
        &self.config
    }

    /// Obtain a usable credential, waiting if every one is cooling down.
    pub async fn acquire(&self) -> Credential {
        loop {
            let wake_at = {
                let mut slots = self.slots.lock().await;
                let now = Instant::now();

                let usable = slots
                    .iter_mut()
                    .filter(|slot| slot.usable_at(now))
                    .min_by_key(|slot| (slot.last_exhausted, slot.credential.slot));

                if let Some(slot) = usable {
                    slot.cooldown_until = None;
                    debug!(credential = %slot.credential.id, used = slot.used, "credential acquired");
                    return slot.credential.clone();
                }

                slots
                    .iter()
                    .filter_map(|slot| slot.cooldown_until)
                    .min()
                    .unwrap_or(now)
            };

            warn!(
                wait_ms = wake_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "all credentials cooling down, waiting"
            );
            sleep_until(wake_at).await;
        }
    }

    /// Record one use of `credential`.
    ///
    /// Returns `true` when this use reached the threshold: the counter resets
    /// and the credential is parked until its cooldown expires.
    pub async fn mark_used(&self, credential: &Credential) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots
            .get_mut(credential.slot)
            .filter(|slot| slot.credential.id == credential.id)
        else {
            warn!(credential = %credential.id, "mark_used for unknown credential");
            return false;
        };

        slot.used += 1;
        if slot.used < self.config.threshold {
            return false;
        }

        let now = Instant::now();
        let mut until = now + self.config.cooldown;
        // Never move a cooldown backwards
        if let Some(previous) = slot.cooldown_until {
            until = until.max(previous);
        }

        slot.used = 0;
        slot.cooldown_until = Some(until);
        slot.last_exhausted = Some(now);

        info!(
            credential = %slot.credential.id,
            cooldown_secs = self.config.cooldown.as_secs(),
            "credential reached usage threshold"
        );
        true
    }

    pub async fn states(&self) -> Vec<CredentialState> {
        let slots = self.slots.lock().await;
        let now = Instant::now();
        slots
            .iter()
            .map(|slot| CredentialState {
                id: slot.credential.id.clone(),
                used: slot.used,
                cooling_down: !slot.usable_at(now),
            })
            .collect()
    }
}
