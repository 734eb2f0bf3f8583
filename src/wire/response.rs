//! Response writer (T2). Buffers a fixed-field record and flushes it
//! as one NUL-terminated line, field order exactly per spec.md §6.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::repo::diff::Tristate;
use crate::repo::types::RepoState;

const FIELD_SEP: u8 = b'\t';
const RECORD_TERMINATOR: u8 = 0;

/// The full 15-field response record. Constructed only after every
/// field is known (spec.md §5: "no field is written to the output
/// until every field is computed, so the reader sees an atomic
/// record") — this type has no partially-built state; it is built in
/// one shot by whichever caller finishes scanning.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: Vec<u8>,
    pub body: Option<RepoBody>,
}

#[derive(Debug, Clone)]
pub struct RepoBody {
    pub workdir: String,
    pub commit: String,
    pub local_branch: String,
    pub upstream_branch: String,
    pub remote_url: String,
    pub repo_state: RepoState,
    pub has_staged: bool,
    pub has_unstaged: Tristate,
    pub has_untracked: Tristate,
    pub ahead: u32,
    pub behind: u32,
    pub num_stashes: u32,
    pub tag: String,
}

impl Response {
    /// spec.md §7: `not-a-repo`, `io-error`, and `library-error` all
    /// collapse to `is_repo = "0"` with no further fields.
    pub fn not_a_repo(id: Vec<u8>) -> Self {
        Self { id, body: None }
    }

    pub fn found(id: Vec<u8>, body: RepoBody) -> Self {
        Self {
            id,
            body: Some(body),
        }
    }

    /// Serializes the tab-separated, NUL-terminated record.
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(&self.id);
        out.push(FIELD_SEP);
        match &self.body {
            None => out.extend_from_slice(b"0"),
            Some(body) => {
                out.extend_from_slice(b"1");
                for field in [
                    strip_trailing_slash(&body.workdir),
                    body.commit.clone(),
                    body.local_branch.clone(),
                    body.upstream_branch.clone(),
                    body.remote_url.clone(),
                    body.repo_state.as_wire_str().to_string(),
                ] {
                    out.push(FIELD_SEP);
                    out.extend_from_slice(field.as_bytes());
                }
                out.push(FIELD_SEP);
                out.extend_from_slice(if body.has_staged { b"1" } else { b"0" });
                out.push(FIELD_SEP);
                out.extend_from_slice(body.has_unstaged.as_wire_str().as_bytes());
                out.push(FIELD_SEP);
                out.extend_from_slice(body.has_untracked.as_wire_str().as_bytes());
                for field in [body.ahead, body.behind, body.num_stashes] {
                    out.push(FIELD_SEP);
                    out.extend_from_slice(field.to_string().as_bytes());
                }
                out.push(FIELD_SEP);
                out.extend_from_slice(body.tag.as_bytes());
            }
        }
        out.push(RECORD_TERMINATOR);
        out
    }
}

/// spec.md §6 item 3: "trailing slash stripped unless root".
fn strip_trailing_slash(workdir: &str) -> String {
    if workdir == "/" {
        workdir.to_string()
    } else {
        workdir.trim_end_matches('/').to_string()
    }
}

/// Writes the encoded record and flushes, so the reader on the other
/// end of the pipe observes each response as soon as it's produced.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response.encode()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_repo_has_only_two_fields() {
        let resp = Response::not_a_repo(b"req-1".to_vec());
        let encoded = resp.encode();
        assert_eq!(encoded, b"req-1\t0\0");
    }

    #[test]
    fn found_encodes_all_fifteen_fields_in_order() {
        let body = RepoBody {
            workdir: "/home/user/project/".to_string(),
            commit: "a".repeat(40),
            local_branch: "main".to_string(),
            upstream_branch: "origin/main".to_string(),
            remote_url: "git@example.com:org/repo.git".to_string(),
            repo_state: RepoState::Rebase,
            has_staged: true,
            has_unstaged: Tristate::Known(false),
            has_untracked: Tristate::Unknown,
            ahead: 2,
            behind: 1,
            num_stashes: 3,
            tag: "v1.0".to_string(),
        };
        let resp = Response::found(b"req-2".to_vec(), body);
        let encoded = resp.encode();
        let text = String::from_utf8(encoded[..encoded.len() - 1].to_vec()).unwrap();
        let fields: Vec<&str> = text.split('\t').collect();
        assert_eq!(fields.len(), 15);
        assert_eq!(fields[0], "req-2");
        assert_eq!(fields[1], "1");
        assert_eq!(fields[2], "/home/user/project"); // trailing slash stripped
        assert_eq!(fields[7], "rebase");
        assert_eq!(fields[8], "1");
        assert_eq!(fields[9], "0");
        assert_eq!(fields[10], "-1");
        assert_eq!(fields[14], "v1.0");
    }

    #[test]
    fn root_workdir_keeps_its_single_slash() {
        assert_eq!(strip_trailing_slash("/"), "/");
    }

    #[tokio::test]
    async fn write_response_flushes_the_terminated_record() {
        let mut buf = Vec::new();
        let resp = Response::not_a_repo(b"x".to_vec());
        write_response(&mut buf, &resp).await.unwrap();
        assert_eq!(buf, b"x\t0\0");
    }
}
