use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use ulid::Ulid;
use url::Url;

use crate::model::UnauthorizedMessageBody;
use crate::DomainError;

/// Time source for `loggedAt` stamps and projection timestamps.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: OffsetDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

/// Source of opaque identifiers (request ids, stream ids, preload keys, IUN seeds).
pub trait IdGenerator: Debug + Send + Sync {
    fn next_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UlidIdGenerator;

impl IdGenerator for UlidIdGenerator {
    fn next_id(&self) -> String {
        Ulid::new().to_string()
    }
}

/// Zero-padded counter, for reproducible fixtures.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{value:026}")
    }
}

/// Format an IUN (`AAAA-BBBB-CCCC-YYYYMM-D-1`) from an opaque id and the issue date.
#[must_use]
pub fn format_iun(seed: &str, issued_at: OffsetDateTime) -> String {
    let mut chars = seed
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect::<Vec<_>>();
    chars.resize(chars.len().max(13), 'X');
    let block = |range: std::ops::Range<usize>| chars[range].iter().collect::<String>();
    format!(
        "{}-{}-{}-{:04}{:02}-{}-1",
        block(0..4),
        block(4..8),
        block(8..12),
        issued_at.year(),
        u8::from(issued_at.month()),
        chars[chars.len() - 1],
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unauthorized {
    pub message: String,
}

impl From<Unauthorized> for UnauthorizedMessageBody {
    fn from(value: Unauthorized) -> Self {
        Self { message: value.message }
    }
}

/// Pass/fail check of an API key. Consulted before any ledger data is read.
pub trait AuthorizationGate: Debug + Send + Sync {
    /// # Errors
    /// Returns [`Unauthorized`] when the key is not accepted.
    fn authorize(&self, api_key: &str) -> Result<Authorized, Unauthorized>;
}

/// Accepts exactly the configured set of keys.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyGate {
    keys: BTreeSet<String>,
}

impl StaticKeyGate {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { keys: keys.into_iter().map(Into::into).collect() }
    }
}

impl AuthorizationGate for StaticKeyGate {
    fn authorize(&self, api_key: &str) -> Result<Authorized, Unauthorized> {
        if self.keys.contains(api_key) {
            Ok(Authorized)
        } else {
            Err(Unauthorized { message: "Forbidden".to_string() })
        }
    }
}

/// Collaborators and settings shared by every use case.
#[derive(Debug, Clone)]
pub struct DomainEnv {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub gate: Arc<dyn AuthorizationGate>,
    /// Echoed as configured; validated as a URL but never normalized.
    pub upload_to_s3_url: String,
    pub download_document_url: String,
    /// Minimum spacing between two successful consumes of one stream; zero disables throttling.
    pub consume_retry_after: Duration,
}

impl DomainEnv {
    /// # Errors
    /// Returns [`DomainError::InvalidUrl`] when either URL does not parse.
    pub fn new(
        gate: Arc<dyn AuthorizationGate>,
        upload_to_s3_url: &str,
        download_document_url: &str,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidIdGenerator),
            gate,
            upload_to_s3_url: parse_url("upload_to_s3_url", upload_to_s3_url)?,
            download_document_url: parse_url("download_document_url", download_document_url)?,
            consume_retry_after: Duration::ZERO,
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn with_consume_retry_after(mut self, retry_after: Duration) -> Self {
        self.consume_retry_after = retry_after;
        self
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<String, DomainError> {
    Url::parse(value)
        .map(|_| value.to_string())
        .map_err(|err| DomainError::InvalidUrl { field, reason: err.to_string() })
}
