//! The per-mailbox protocol state machine (spec §3 `PopSession`, §4.3)

use crate::cache::Coordinator;
use crate::config::{AccountConfig, PopConfig, TlsMode};
use crate::envelope::EnvelopeParser;
use crate::error::{Error, Result};
use crate::header::HeaderRecord;
use crate::pop3::capability::Capability;
use crate::pop3::proto::{self, Request};
use crate::pop3::{auth, CheckOutcome};
use crate::tls::TlsEngine;
use crate::transport::{TcpTransport, Transport};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// spec §3 `PopSession.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    None,
    Authenticated,
    Disconnected,
    ByeSent,
}

/// Size of the fallback (index, temp-path) ring used when no body cache
/// is configured (spec §3: "bounded ring; size is an implementation
/// constant").
const FALLBACK_RING_SIZE: usize = 8;

/// The per-mailbox protocol state machine (spec §3 `PopSession`).
pub struct PopSession {
    account: AccountConfig,
    config: PopConfig,
    tls_engine: Option<TlsEngine>,
    envelope_parser: Box<dyn EnvelopeParser>,
    cache: Option<Coordinator>,

    transport: Option<Box<dyn Transport>>,
    uidl_cap: Capability,
    top_cap: Capability,
    status: Status,
    size: u64,
    check_time: Option<Instant>,
    err_msg: Option<String>,
    clear_cache: bool,
    records: Vec<HeaderRecord>,
    fallback_ring: Vec<Option<(usize, PathBuf)>>,
}

impl PopSession {
    #[must_use]
    pub fn new(
        account: AccountConfig,
        config: PopConfig,
        tls_engine: Option<TlsEngine>,
        envelope_parser: Box<dyn EnvelopeParser>,
        cache: Option<Coordinator>,
    ) -> Self {
        Self {
            account,
            config,
            tls_engine,
            envelope_parser,
            cache,
            transport: None,
            uidl_cap: Capability::Unknown,
            top_cap: Capability::Unknown,
            status: Status::None,
            size: 0,
            check_time: None,
            err_msg: None,
            clear_cache: false,
            records: Vec::new(),
            fallback_ring: vec![None; FALLBACK_RING_SIZE],
        }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn records(&self) -> &[HeaderRecord] {
        &self.records
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.err_msg.as_deref()
    }

    /// Mark the message at `index` for deletion on the next [`Self::sync`]
    /// (spec §4.3.6: deletions are staged locally and only committed to
    /// the server by `DELE` + `QUIT`).
    pub fn mark_deleted(&mut self, index: usize, deleted: bool) {
        if let Some(r) = self.records.get_mut(index) {
            r.flags.deleted = deleted;
        }
    }

    /// Connect, negotiate TLS if configured, read the greeting,
    /// authenticate, then run the first `fetch_headers` (spec §4.3.2).
    ///
    /// # Errors
    ///
    /// `Error::Transport` on connection failure, `Error::Trust` on TLS
    /// failure, `Error::Protocol` on authentication failure.
    pub fn open(&mut self, connect_timeout: Duration) -> Result<()> {
        let (mut transport, greeting) = self.connect(connect_timeout)?;
        self.authenticate(transport.as_mut(), &greeting)?;
        self.transport = Some(transport);
        self.status = Status::Authenticated;

        self.fetch_stat()?;
        self.fetch_headers()?;
        self.check_time = Some(Instant::now());
        info!(records = self.records.len(), "mailbox opened");
        Ok(())
    }

    /// Connect, layer TLS (initial or STARTTLS, spec §4.2.1), and read
    /// the greeting. The TLS mode decision happens on the concrete
    /// [`TcpTransport`] before it is ever boxed as `dyn Transport`, so
    /// there is never a need to recover a concrete type from a trait
    /// object afterwards.
    fn connect(&self, connect_timeout: Duration) -> Result<(Box<dyn Transport>, String)> {
        let mut tcp = TcpTransport::connect(&self.account.host, self.account.port, connect_timeout)?;

        if self.account.tls_mode == TlsMode::Tls {
            let engine = self
                .tls_engine
                .as_ref()
                .ok_or_else(|| Error::Config("TLS requested but no TlsEngine configured".into()))?;
            let mut transport: Box<dyn Transport> = Box::new(engine.negotiate(tcp, &self.account.host)?);
            let greeting = auth::read_greeting(transport.as_mut())?;
            debug!(%greeting, "read greeting");
            return Ok((transport, greeting));
        }

        let greeting = auth::read_greeting(&mut tcp)?;
        debug!(%greeting, "read greeting");

        if self.account.tls_mode == TlsMode::StartTls {
            proto::query(&mut tcp, &Request::StartTls)?;
            let engine = self
                .tls_engine
                .as_ref()
                .ok_or_else(|| Error::Config("STARTTLS requested but no TlsEngine configured".into()))?;
            let transport: Box<dyn Transport> = Box::new(engine.negotiate(tcp, &self.account.host)?);
            return Ok((transport, greeting));
        }

        Ok((Box::new(tcp), greeting))
    }

    fn authenticate(&self, transport: &mut dyn Transport, greeting: &str) -> Result<()> {
        let password = self
            .account
            .password
            .as_deref()
            .ok_or_else(|| Error::Config("no password supplied".into()))?;

        let result = match auth::apop_challenge(greeting) {
            Some(challenge) => auth::apop(transport, challenge, &self.account.user, password),
            None => auth::user_pass(transport, &self.account.user, password),
        };
        result.map_err(|e| {
            warn!(error = %e, "authentication failed");
            e
        })
    }

    fn fetch_stat(&mut self) -> Result<()> {
        let transport = self.transport()?;
        let trailing = proto::query(transport, &Request::Stat)?;
        let (_count, size) = proto::parse_stat(&trailing)?;
        self.size = size;
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut dyn Transport> {
        self.transport
            .as_deref_mut()
            .ok_or_else(|| Error::Transport("not connected".into()))
    }

    /// spec §4.3.4, steps 1-6.
    ///
    /// # Errors
    ///
    /// Propagates transport, protocol, or cache errors.
    pub fn fetch_headers(&mut self) -> Result<()> {
        // Step 1: mark every record stale.
        for r in &mut self.records {
            r.refno = -1;
        }

        // Step 2: enumerate UIDL, matching existing records or allocating new ones.
        let mut seen_uidls = Vec::new();
        let mut new_uidls = Vec::new();
        {
            let transport = self.transport()?;
            let records = &mut self.records;
            let mut clear_cache = false;
            let mut new_order = Vec::new();

            proto::fetch_data(transport, &Request::Uidl(None), |line| {
                let (refno, uidl) = proto::parse_uidl_line(line)?;
                seen_uidls.push(uidl.clone());

                if let Some(existing) = records.iter_mut().find(|r| r.uidl == uidl) {
                    let new_index = new_order.len();
                    if new_index != existing.index {
                        clear_cache = true;
                    }
                    existing.refno = i64::from(refno);
                    existing.index = new_index;
                } else {
                    new_uidls.push((refno, uidl.clone(), new_order.len()));
                }
                new_order.push(uidl);
                Ok(())
            })?;

            self.uidl_cap.observe(true);
            if clear_cache {
                self.clear_cache = true;
            }
        }

        // Empty UIDL reply with a nonzero STAT count demotes the
        // capability (spec §8 boundary behaviour), handled by the caller
        // noticing `uidl_cap.is_absent()` was never set here since the
        // server answered `+OK`; a `-ERR` is handled by the `Err` arm below.
        if seen_uidls.is_empty() && self.size > 0 {
            self.uidl_cap = Capability::Absent;
        }

        for (refno, uidl, index) in new_uidls {
            self.records.push(HeaderRecord::new(uidl, i64::from(refno), index));
        }

        // Step 3: anything still at refno -1 was deleted server-side.
        let lost = self.records.iter().filter(|r| r.is_stale()).count();
        for r in &mut self.records {
            if r.is_stale() {
                r.flags.deleted = true;
            }
        }
        if lost > 0 {
            info!(lost, "messages have been lost");
        }

        // Steps 4-5: populate envelopes for newly discovered records.
        let indices: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_stale() && r.env.subject.is_none() && r.env.from.is_none())
            .map(|(i, _)| i)
            .collect();
        for idx in indices {
            self.populate_one_header(idx)?;
        }

        // Step 6: orphan sweep.
        if self.config.message_cache_clean {
            if let Some(cache) = &self.cache {
                let live: Vec<String> = self.records.iter().map(|r| r.uidl.clone()).collect();
                let evicted = cache.evict_orphans(&live)?;
                if evicted > 0 {
                    debug!(evicted, "swept orphaned cache entries");
                }
            }
        }

        Ok(())
    }

    fn populate_one_header(&mut self, idx: usize) -> Result<()> {
        let uidl = self.records[idx].uidl.clone();

        if let Some(cache) = &self.cache {
            if let Some(persisted) = cache.headers.fetch(&uidl)? {
                self.records[idx].apply_persisted(persisted);
                if cache.bodies.exists(&uidl)? {
                    self.records[idx].flags.read = true;
                } else if self.config.mark_old {
                    self.records[idx].flags.old = true;
                }
                return Ok(());
            }
        }

        let refno = self.records[idx].refno;
        if refno <= 0 {
            return Ok(());
        }
        let refno = u32::try_from(refno).unwrap_or(0);

        let top_supported = !self.top_cap.is_absent();
        let mut header_block = Vec::new();
        let transport = self.transport()?;
        let result = if top_supported {
            proto::fetch_data(transport, &Request::Top { refno, lines: 0 }, |line| {
                header_block.extend_from_slice(line);
                header_block.extend_from_slice(b"\r\n");
                Ok(())
            })
        } else {
            proto::fetch_data(transport, &Request::Retr(refno), |line| {
                header_block.extend_from_slice(line);
                header_block.extend_from_slice(b"\r\n");
                Ok(())
            })
        };

        match result {
            Ok(()) => self.top_cap.observe(true),
            Err(Error::Protocol(msg)) if top_supported => {
                self.top_cap.observe(false);
                warn!(%msg, "TOP unsupported, falling back to RETR for headers");
                return self.populate_one_header(idx);
            }
            Err(e) => return Err(e),
        }

        let env = self.envelope_parser.parse(&header_block);
        self.records[idx].env = env;

        if let Some(cache) = &self.cache {
            cache.headers.store(&uidl, &self.records[idx].to_persisted())?;
        }
        Ok(())
    }

    /// spec §4.3.5.
    ///
    /// # Errors
    ///
    /// `Error::Stale` if the record's refno is -1; otherwise transport,
    /// protocol, or integrity errors after the retry budget (one retry
    /// via reconnect) is exhausted.
    pub fn fetch_message(&mut self, index: usize) -> Result<Box<dyn std::io::Read + Send>> {
        self.reconnect()?;

        let uidl = self.records[index].uidl.clone();
        if let Some(cache) = &self.cache {
            if cache.bodies.exists(&uidl)? {
                return cache.bodies.get(&uidl);
            }
        }

        if self.records[index].is_stale() {
            return Err(Error::Stale);
        }

        match self.fetch_message_once(index) {
            Ok(data) => Ok(data),
            Err(Error::Transport(msg)) => {
                warn!(%msg, "transport failure fetching message, reconnecting and retrying");
                self.status = Status::Disconnected;
                self.reconnect()?;
                self.fetch_message_once(index)
            }
            Err(e) => Err(e),
        }
    }

    fn fetch_message_once(&mut self, index: usize) -> Result<Box<dyn std::io::Read + Send>> {
        let uidl = self.records[index].uidl.clone();
        let refno = u32::try_from(self.records[index].refno).map_err(|_| Error::Stale)?;

        if let Some(cache) = &self.cache {
            let mut writer = cache.bodies.put(&uidl)?;
            let transport = self.transport()?;
            let result = proto::fetch_data(transport, &Request::Retr(refno), |line| {
                use std::io::Write as _;
                writer
                    .write_all(line)
                    .and_then(|()| writer.write_all(b"\r\n"))
                    .map_err(|e| Error::Integrity(e.to_string()))
            });
            match result {
                Ok(()) => {
                    writer.commit()?;
                    self.records[index].flags.read = true;
                    return cache.bodies.get(&uidl);
                }
                Err(e) => {
                    writer.abort()?;
                    return Err(e);
                }
            }
        }

        // No body cache configured: fall back to the temp-file ring.
        let tmp = tempfile::NamedTempFile::new().map_err(Error::Io)?;
        let path = tmp.path().to_path_buf();
        {
            use std::io::Write as _;
            let mut file = tmp.reopen().map_err(Error::Io)?;
            let transport = self.transport()?;
            proto::fetch_data(transport, &Request::Retr(refno), |line| {
                file.write_all(line)
                    .and_then(|()| file.write_all(b"\r\n"))
                    .map_err(|e| Error::Integrity(e.to_string()))
            })?;
        }
        let slot = index % self.fallback_ring.len();
        self.fallback_ring[slot] = Some((index, path));
        self.records[index].flags.read = true;
        Ok(Box::new(std::fs::File::open(tmp.path()).map_err(Error::Io)?))
    }

    /// spec §4.3.6.
    ///
    /// # Errors
    ///
    /// Transport/protocol errors after retry on `QUIT` failure.
    pub fn sync(&mut self) -> Result<()> {
        self.reconnect()?;

        loop {
            let to_delete: Vec<usize> = self
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.flags.deleted && r.refno > 0)
                .map(|(i, _)| i)
                .collect();

            for idx in to_delete {
                let refno = u32::try_from(self.records[idx].refno).unwrap_or(0);
                let transport = self.transport()?;
                proto::query(transport, &Request::Dele(refno))?;
                if let Some(cache) = &self.cache {
                    let uidl = &self.records[idx].uidl;
                    cache.bodies.del(uidl)?;
                    cache.headers.delete(uidl)?;
                }
            }

            if let Some(cache) = &self.cache {
                for r in self.records.iter().filter(|r| r.flags.changed) {
                    cache.headers.store(&r.uidl, &r.to_persisted())?;
                }
            }

            let transport = self.transport()?;
            match proto::query(transport, &Request::Quit) {
                Ok(_) => {
                    self.status = Status::Disconnected;
                    if let Some(cache) = &self.cache {
                        let uidls: Vec<String> = self.records.iter().map(|r| r.uidl.clone()).collect();
                        cache.clear_bodies(&uidls)?;
                    }
                    return Ok(());
                }
                Err(Error::Protocol(msg)) => {
                    warn!(%msg, "QUIT failed, reconnecting and retrying sync");
                    self.err_msg = Some(msg);
                    self.status = Status::Disconnected;
                    self.reconnect()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// spec §4.3.7: rate-limited re-check.
    ///
    /// # Errors
    ///
    /// Propagates `reconnect`/`fetch_headers` errors.
    pub fn check(&mut self, connect_timeout: Duration) -> Result<CheckOutcome> {
        if let Some(last) = self.check_time {
            if last.elapsed() < self.config.check_interval {
                return Ok(CheckOutcome::NoChange);
            }
        }

        let before = self.records.len();
        self.status = Status::Disconnected;
        self.open(connect_timeout)?;

        Ok(if self.records.len() > before {
            CheckOutcome::NewMail
        } else {
            CheckOutcome::NoChange
        })
    }

    /// spec §4.3.8: reconnect at the top of every mutating operation.
    ///
    /// # Errors
    ///
    /// Propagates connection/authentication failures.
    pub fn reconnect(&mut self) -> Result<()> {
        if self.status == Status::Authenticated {
            return Ok(());
        }

        let (mut transport, greeting) = self.connect(Duration::from_secs(30))?;
        self.authenticate(transport.as_mut(), &greeting)?;
        self.transport = Some(transport);
        self.status = Status::Authenticated;

        self.fetch_headers()?;

        if self.clear_cache {
            if let Some(cache) = &self.cache {
                let uidls: Vec<String> = self.records.iter().map(|r| r.uidl.clone()).collect();
                cache.clear_bodies(&uidls)?;
            }
            self.clear_cache = false;
        }
        Ok(())
    }

    /// Close the connection with `QUIT`, best-effort.
    pub fn close(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            let _ = proto::query(transport.as_mut(), &Request::Quit);
            let _ = transport.close();
        }
        self.status = Status::Disconnected;
        self.transport = None;
    }
}

impl Drop for PopSession {
    fn drop(&mut self) {
        if self.status == Status::Authenticated {
            self.close();
        }
    }
}
