//! Pure parsers for git's machine-readable output formats.
//!
//! Every parser is total over well-formed input and never panics on
//! partial or trailing data. The status parser is incremental: it can be
//! fed output in arbitrary chunks and retains the unconsumed trailing
//! fragment between calls.

use super::types::{Commit, RawStatusEntry, Ref, RefKind, Remote, StashEntry, Submodule, TreeRow};

/// Parsed result of a full status enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusList {
    /// Entries in stream order, capped at the configured limit.
    pub entries: Vec<RawStatusEntry>,
    /// True when the stream contained more entries than the limit.
    pub hit_limit: bool,
}

/// Incremental parser for the NUL-delimited status stream.
///
/// Entries are NUL-delimited: two status-code characters, a space, then a
/// path. When the first code character is `R` (rename) or `C` (copy), an
/// extra NUL-delimited rename-source field precedes the path. A path ending
/// in `/` denotes a nested repository and is dropped.
#[derive(Debug)]
pub struct StatusParser {
    buffer: String,
    entries: Vec<RawStatusEntry>,
    limit: usize,
    hit_limit: bool,
}

impl StatusParser {
    /// Creates a parser that stops recording entries beyond `limit`.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            entries: Vec::new(),
            limit,
            hit_limit: false,
        }
    }

    /// Feeds a chunk of raw output.
    ///
    /// Feeding the whole stream in one call or split at arbitrary points
    /// yields the same entry sequence.
    pub fn feed(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        self.drain();
    }

    /// Number of entries parsed so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries have been parsed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the parser, returning the parsed entries and the limit flag.
    /// Any incomplete trailing fragment is discarded.
    pub fn finish(self) -> StatusList {
        StatusList {
            entries: self.entries,
            hit_limit: self.hit_limit,
        }
    }

    fn drain(&mut self) {
        let mut consumed = 0;

        loop {
            let rest = &self.buffer[consumed..];
            let Some(first_nul) = rest.find('\0') else {
                break;
            };

            let header = &rest[..first_nul];
            let bytes = header.as_bytes();
            if bytes.len() < 4 || !bytes[0].is_ascii() || !bytes[1].is_ascii() || bytes[2] != b' ' {
                // Malformed entry; skip past it rather than stalling the stream.
                consumed += first_nul + 1;
                continue;
            }

            let index_code = bytes[0] as char;
            let worktree_code = bytes[1] as char;
            let first_field = &header[3..];

            let needs_second_field = index_code == 'R' || index_code == 'C';
            let (path, rename_source, entry_len) = if needs_second_field {
                let after = &rest[first_nul + 1..];
                let Some(second_nul) = after.find('\0') else {
                    // Second field not buffered yet; wait for more input.
                    break;
                };
                (
                    after[..second_nul].to_string(),
                    Some(first_field.to_string()),
                    first_nul + 1 + second_nul + 1,
                )
            } else {
                (first_field.to_string(), None, first_nul + 1)
            };

            consumed += entry_len;

            // A trailing '/' denotes a nested repository; not reported.
            if path.ends_with('/') {
                continue;
            }

            if self.entries.len() >= self.limit {
                self.hit_limit = true;
                continue;
            }

            self.entries.push(RawStatusEntry {
                index_code,
                worktree_code,
                path,
                rename_source,
            });
        }

        self.buffer.drain(..consumed);
    }
}

/// Parses one `refname objecthash` line from a ref listing.
///
/// `refs/heads/<n>` becomes a local branch, `refs/remotes/<remote>/<n>` a
/// remote branch (remote split at the first `/`), `refs/tags/<n>` a tag;
/// anything else is discarded.
pub fn parse_ref_line(line: &str) -> Option<Ref> {
    let (refname, hash) = line.trim_end().split_once(' ')?;
    let commit = Some(hash.to_string());

    if let Some(name) = refname.strip_prefix("refs/heads/") {
        return Some(Ref {
            kind: RefKind::Head,
            name: name.to_string(),
            commit,
            remote: None,
        });
    }
    if let Some(rest) = refname.strip_prefix("refs/remotes/") {
        let (remote, _) = rest.split_once('/')?;
        return Some(Ref {
            kind: RefKind::RemoteHead,
            name: rest.to_string(),
            commit,
            remote: Some(remote.to_string()),
        });
    }
    if let Some(name) = refname.strip_prefix("refs/tags/") {
        return Some(Ref {
            kind: RefKind::Tag,
            name: name.to_string(),
            commit,
            remote: None,
        });
    }

    None
}

/// Parses a full ref listing.
pub fn parse_refs(output: &str) -> Vec<Ref> {
    output.lines().filter_map(parse_ref_line).collect()
}

/// Parses commit records in the engine's fixed log format.
///
/// Each record holds four newline-delimited fields: hash, author email,
/// space-joined parent hashes, and the message body. Records are separated
/// by a double-NUL terminator.
pub fn parse_commits(output: &str) -> Vec<Commit> {
    output
        .split("\0\0")
        .filter_map(parse_commit_record)
        .collect()
}

fn parse_commit_record(record: &str) -> Option<Commit> {
    let record = record.trim_start_matches(['\n', '\0']);
    if record.trim().is_empty() {
        return None;
    }

    let mut lines = record.splitn(4, '\n');
    let hash = lines.next()?.trim().to_string();
    if hash.is_empty() {
        return None;
    }
    let author_email = lines.next()?.trim().to_string();
    let parents_field = lines.next()?.trim();
    let parents = if parents_field.is_empty() {
        Vec::new()
    } else {
        parents_field.split(' ').map(str::to_string).collect()
    };
    let message = lines.next().unwrap_or("").trim_end_matches('\n').to_string();

    Some(Commit {
        hash,
        author_email,
        parents,
        message,
    })
}

/// Parses whitespace-delimited tree/index rows: mode, object id,
/// size-or-stage, path.
pub fn parse_tree_rows(output: &str) -> Vec<TreeRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let mode = fields.next()?.to_string();
            let object = fields.next()?.to_string();
            let size_or_stage = fields.next()?.to_string();
            let path = fields.next()?.to_string();
            Some(TreeRow {
                mode,
                object,
                size_or_stage,
                path,
            })
        })
        .collect()
}

/// Parses a `.gitmodules` descriptor file.
///
/// INI-like format with `[submodule "name"]` headers and `key = value`
/// body lines. A record is only emitted once it has a name, a path and a
/// URL.
pub fn parse_gitmodules(content: &str) -> Vec<Submodule> {
    let mut submodules = Vec::new();
    let mut name: Option<String> = None;
    let mut path: Option<String> = None;
    let mut url: Option<String> = None;

    let mut flush = |name: &mut Option<String>, path: &mut Option<String>, url: &mut Option<String>| {
        if let (Some(n), Some(p), Some(u)) = (name.take(), path.take(), url.take()) {
            submodules.push(Submodule {
                name: n,
                path: p,
                url: u,
            });
        }
    };

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            flush(&mut name, &mut path, &mut url);
            name = parse_section_name(line);
            path = None;
            url = None;
        } else if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "path" => path = Some(value.trim().to_string()),
                "url" => url = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    flush(&mut name, &mut path, &mut url);

    submodules
}

fn parse_section_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("[submodule")?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Parses `stash@{N}: description` lines into stash entries.
pub fn parse_stash_list(output: &str) -> Vec<StashEntry> {
    output
        .lines()
        .enumerate()
        .filter_map(|(ix, line)| {
            let (selector, description) = line.split_once(": ")?;
            let index = parse_stash_index(selector).unwrap_or(ix);
            Some(StashEntry {
                index,
                description: description.to_string(),
            })
        })
        .collect()
}

fn parse_stash_index(selector: &str) -> Option<usize> {
    let start = selector.rfind("@{")? + 2;
    let end = selector[start..].find('}')? + start;
    selector[start..end].parse().ok()
}

/// Parses `remote -v` output into per-remote fetch/push URLs.
///
/// Lines look like `origin\thttps://example.com/repo.git (fetch)`.
pub fn parse_remotes(output: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();

    for line in output.lines() {
        let Some((name, rest)) = line.split_once('\t') else {
            continue;
        };
        let (url, direction) = match rest.rsplit_once(' ') {
            Some((url, direction)) => (url.trim(), direction),
            None => (rest.trim(), "(fetch)"),
        };
        if url.is_empty() {
            continue;
        }

        let remote = match remotes.iter_mut().find(|r| r.name == name) {
            Some(remote) => remote,
            None => {
                remotes.push(Remote {
                    name: name.to_string(),
                    fetch_url: None,
                    push_url: None,
                });
                remotes.last_mut().expect("just pushed")
            }
        };

        match direction {
            "(push)" => remote.push_url = Some(url.to_string()),
            _ => remote.fetch_url = Some(url.to_string()),
        }
    }

    remotes
}

/// Parses a `rev-list --left-right --count` pair into (ahead, behind).
pub fn parse_ahead_behind(output: &str) -> Option<(u32, u32)> {
    let mut fields = output.split_whitespace();
    let ahead = fields.next()?.parse().ok()?;
    let behind = fields.next()?.parse().ok()?;
    Some((ahead, behind))
}
