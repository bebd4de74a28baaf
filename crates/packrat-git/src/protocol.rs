//! Git protocol v2 over smart HTTP.
//!
//! Both requests are POSTs to the upload-pack endpoint with the
//! `Git-Protocol: version=2` header: `ls-refs` discovers the ref to clone
//! and `fetch` asks for it as a single `want`.
//! See: https://git-scm.com/docs/protocol-v2

use crate::config::CloneConfig;
use crate::pktline::{PktLineReader, PktLineWriter};
use crate::{GitError, Result};
use packrat_storage::ObjectId;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

const REQUEST_CONTENT_TYPE: &str = "application/x-git-upload-pack-request";
const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";
const SYMREF_ATTR: &str = "symref-target:";

/// A reference advertised by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Object the ref points to.
    pub id: ObjectId,
    /// Ref name, e.g. `HEAD` or `refs/heads/main`.
    pub name: String,
    /// Target of a symbolic ref, when the remote reported one.
    pub symref_target: Option<String>,
}

/// Source of refs and packs for a clone.
pub trait Transport {
    /// Returns the first ref the remote advertises.
    fn discover_ref(&self, url: &str) -> Result<RemoteRef>;

    /// Requests a pack for `want` and returns the raw response body.
    fn fetch_pack(&self, url: &str, want: &RemoteRef) -> Result<Vec<u8>>;
}

/// Request body for `ls-refs`, asking for symref targets.
pub fn ls_refs_request() -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line("command=ls-refs")?;
    writer.delimiter_pkt()?;
    writer.write_line("symrefs")?;
    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

/// Request body for `fetch` with a single want and no haves.
pub fn fetch_request(want: &ObjectId) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line("command=fetch")?;
    writer.delimiter_pkt()?;
    writer.write_line(&format!("want {}", want))?;
    writer.write_line("done")?;
    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

/// Parses an `ls-refs` response into the advertised refs, in order.
///
/// Each line is `<hex id> <name>` followed by optional attributes; only
/// `symref-target:` is kept.
pub fn parse_ls_refs(body: &[u8]) -> Result<Vec<RemoteRef>> {
    let mut reader = PktLineReader::new(body);
    let mut refs = Vec::new();

    for pkt in reader.read_until_flush()? {
        let Some(line) = pkt.as_str() else {
            continue;
        };
        let mut fields = line.split(' ');
        let (Some(hex), Some(name)) = (fields.next(), fields.next()) else {
            return Err(GitError::Protocol(format!("malformed ref line {:?}", line)));
        };
        let id = ObjectId::from_hex(hex)
            .map_err(|_| GitError::Protocol(format!("malformed ref id {:?}", hex)))?;
        let symref_target = fields
            .find_map(|attr| attr.strip_prefix(SYMREF_ATTR))
            .map(str::to_owned);

        refs.push(RemoteRef {
            id,
            name: name.to_string(),
            symref_target,
        });
    }

    Ok(refs)
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: CloneConfig,
}

impl HttpTransport {
    /// Creates a transport using the agent and timeout from `config`.
    pub fn new(config: &CloneConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let endpoint = self.config.endpoint(url);
        tracing::debug!(%endpoint, bytes = body.len(), "POST");

        let response = self
            .client
            .post(&endpoint)
            .header("Git-Protocol", "version=2")
            .header(CONTENT_TYPE, REQUEST_CONTENT_TYPE)
            .header(ACCEPT, RESULT_CONTENT_TYPE)
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(GitError::Transport(format!(
                "{} returned {}",
                endpoint, status
            )));
        }

        let bytes = response.bytes()?;
        tracing::debug!(%endpoint, bytes = bytes.len(), "response received");
        Ok(bytes.to_vec())
    }
}

impl Transport for HttpTransport {
    fn discover_ref(&self, url: &str) -> Result<RemoteRef> {
        let body = self.post(url, ls_refs_request()?)?;
        let remote = parse_ls_refs(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| GitError::Protocol("remote advertised no refs".to_string()))?;
        tracing::info!(id = %remote.id, name = %remote.name, "discovered ref");
        Ok(remote)
    }

    fn fetch_pack(&self, url: &str, want: &RemoteRef) -> Result<Vec<u8>> {
        let body = self.post(url, fetch_request(&want.id)?)?;
        tracing::info!(bytes = body.len(), "fetched pack response");
        Ok(body)
    }
}
