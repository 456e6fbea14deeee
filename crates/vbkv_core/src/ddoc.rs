//! Design documents.
//!
//! Design documents live in a reserved partition of each bucket
//! ([`crate::DDOC_VBID`]) that is Active for the bucket's whole life. Bodies
//! are JSON; the parsed set is cached per bucket and rebuilt lazily after
//! every write. Like every other partition, the reserved one is out of reach
//! once the bucket is closed.
//!
//! # Example
//!
//! ```rust
//! use vbkv_core::{Bucket, BucketConfig};
//!
//! let bucket = Bucket::new("default", &BucketConfig::default()).unwrap();
//! bucket
//!     .set_ddoc("_design/users", br#"{"views":{"by_name":{"map":"emit(doc.name)"}}}"#)
//!     .unwrap();
//!
//! let ddocs = bucket.get_ddocs().unwrap();
//! assert!(ddocs["_design/users"].views.contains_key("by_name"));
//! ```

use crate::bucket::Bucket;
use crate::error::{CoreError, CoreResult};
use crate::ops::{MutationRequest, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// All design documents of a bucket, keyed by id.
pub type DDocs = BTreeMap<String, DDoc>;

/// Parsed design documents tagged with the write version they reflect.
#[derive(Debug)]
pub(crate) struct CachedDDocs {
    version: u64,
    ddocs: Arc<DDocs>,
}

/// A parsed design document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DDoc {
    /// Language the view functions are written in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Views by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub views: BTreeMap<String, View>,
    /// Indexing options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<DDocOptions>,
}

/// A map function with an optional reduce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Map function source.
    pub map: String,
    /// Reduce function source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// Design document options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DDocOptions {
    /// Expose each document's local sequence number to map functions.
    #[serde(default, skip_serializing_if = "is_false")]
    pub local_seq: bool,
    /// Run views over design documents too.
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_design: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

impl DDoc {
    /// Parses a design document body.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDesignDoc` if `body` is not a design document object.
    pub fn parse(id: &str, body: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(body).map_err(|e| CoreError::invalid_design_doc(id, e))
    }
}

impl Bucket {
    /// Returns the raw body of design document `id`, `None` if absent or
    /// the bucket is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the design-document partition fails.
    pub fn get_ddoc(&self, id: &str) -> CoreResult<Option<Vec<u8>>> {
        let Some(vb) = self.ddoc_vbucket() else {
            return Ok(None);
        };
        let resp = vb.get(id.as_bytes())?;
        match resp.status {
            Status::Success => Ok(resp.value),
            _ => Ok(None),
        }
    }

    /// Stores design document `id`.
    ///
    /// The body must parse as a [`DDoc`]; the cached set returned by
    /// [`Bucket::get_ddocs`] is invalidated. Returns false, storing nothing,
    /// if the bucket is closed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDesignDoc` for a malformed body, `DesignDocNotStored`
    /// if the partition refuses the write, or a storage error.
    pub fn set_ddoc(&self, id: &str, body: &[u8]) -> CoreResult<bool> {
        DDoc::parse(id, body)?;
        let Some(vb) = self.ddoc_vbucket() else {
            return Ok(false);
        };
        let resp = vb.mutate(&MutationRequest::set(id, body))?;
        if resp.status != Status::Success {
            return Err(CoreError::DesignDocNotStored {
                id: id.to_string(),
                status: resp.status,
            });
        }
        self.invalidate_ddocs();
        debug!(bucket = %self.name(), ddoc = id, cas = resp.cas, "design document stored");
        Ok(true)
    }

    /// Removes design document `id`. Returns false if it did not exist or
    /// the bucket is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the design-document partition fails.
    pub fn delete_ddoc(&self, id: &str) -> CoreResult<bool> {
        let Some(vb) = self.ddoc_vbucket() else {
            return Ok(false);
        };
        let resp = vb.mutate(&MutationRequest::delete(id))?;
        if resp.status != Status::Success {
            return Ok(false);
        }
        self.invalidate_ddocs();
        debug!(bucket = %self.name(), ddoc = id, "design document deleted");
        Ok(true)
    }

    /// Visits raw design documents with id `>= start` in ascending order.
    /// Visits nothing once the bucket is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the design-document partition fails.
    pub fn visit_ddocs<F>(&self, start: &[u8], visitor: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        match self.ddoc_vbucket() {
            Some(vb) => vb.visit(start, visitor),
            None => Ok(()),
        }
    }

    /// Returns all design documents, parsed.
    ///
    /// The result is cached until the next write, and a snapshot taken
    /// before a write is never returned after that write completes. A closed
    /// bucket has no design documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition fails or a stored body no longer
    /// parses.
    pub fn get_ddocs(&self) -> CoreResult<Arc<DDocs>> {
        if !self.available() {
            return Ok(Arc::default());
        }
        let version = self.ddocs_version.load(Ordering::Acquire);
        let cached = self.ddocs.load_full();
        if let Some(hit) = cached.as_ref().filter(|c| c.version == version) {
            return Ok(Arc::clone(&hit.ddocs));
        }

        let ddocs = Arc::new(self.load_ddocs()?);
        let fresh = Arc::new(CachedDDocs {
            version,
            ddocs: Arc::clone(&ddocs),
        });
        // Losing this race means another reader refreshed the cache first.
        let _ = self.ddocs.compare_and_swap(&cached, Some(fresh));
        Ok(ddocs)
    }

    fn load_ddocs(&self) -> CoreResult<DDocs> {
        let mut ddocs = DDocs::new();
        let mut parse_err = None;
        self.visit_ddocs(b"", |key, body| {
            let id = String::from_utf8_lossy(key).into_owned();
            match DDoc::parse(&id, body) {
                Ok(ddoc) => {
                    ddocs.insert(id, ddoc);
                    true
                }
                Err(err) => {
                    parse_err = Some(err);
                    false
                }
            }
        })?;
        parse_err.map_or(Ok(ddocs), Err)
    }

    fn invalidate_ddocs(&self) {
        self.ddocs_version.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketConfig;
    use crate::types::VBState;

    const USERS: &[u8] = br#"{"language":"javascript","views":{"by_name":{"map":"function(doc){emit(doc.name)}","reduce":"_count"}}}"#;

    fn bucket() -> Arc<Bucket> {
        Bucket::new("ddocs", &BucketConfig::default()).unwrap()
    }

    #[test]
    fn parse_full_document() {
        let ddoc = DDoc::parse(
            "_design/x",
            br#"{"views":{"v":{"map":"m"}},"options":{"local_seq":true}}"#,
        )
        .unwrap();
        assert_eq!(ddoc.language, None);
        assert_eq!(ddoc.views["v"].map, "m");
        assert_eq!(ddoc.views["v"].reduce, None);
        assert!(ddoc.options.unwrap().local_seq);
        assert!(!ddoc.options.unwrap().include_design);
    }

    #[test]
    fn serialization_omits_defaults() {
        let ddoc = DDoc::parse("_design/x", br#"{"views":{"v":{"map":"m"}}}"#).unwrap();
        let json = serde_json::to_string(&ddoc).unwrap();
        assert_eq!(json, r#"{"views":{"v":{"map":"m"}}}"#);
    }

    #[test]
    fn set_and_get_roundtrip() {
        let b = bucket();
        assert_eq!(b.get_ddoc("_design/users").unwrap(), None);

        b.set_ddoc("_design/users", USERS).unwrap();
        assert_eq!(b.get_ddoc("_design/users").unwrap(), Some(USERS.to_vec()));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let b = bucket();
        let err = b.set_ddoc("_design/bad", b"{not json").unwrap_err();
        assert!(matches!(err, CoreError::InvalidDesignDoc { ref id, .. } if id == "_design/bad"));

        let err = b.set_ddoc("_design/bad", b"[1, 2]").unwrap_err();
        assert!(matches!(err, CoreError::InvalidDesignDoc { .. }));
        assert_eq!(b.get_ddoc("_design/bad").unwrap(), None);
    }

    #[test]
    fn get_ddocs_reflects_writes_immediately() {
        let b = bucket();
        assert!(b.get_ddocs().unwrap().is_empty());

        b.set_ddoc("_design/users", USERS).unwrap();
        let ddocs = b.get_ddocs().unwrap();
        assert_eq!(ddocs.len(), 1);
        assert_eq!(
            ddocs["_design/users"].views["by_name"].reduce.as_deref(),
            Some("_count")
        );

        b.set_ddoc("_design/empty", b"{}").unwrap();
        assert_eq!(b.get_ddocs().unwrap().len(), 2);

        assert!(b.delete_ddoc("_design/users").unwrap());
        assert!(!b.delete_ddoc("_design/users").unwrap());
        let ddocs = b.get_ddocs().unwrap();
        assert_eq!(ddocs.keys().collect::<Vec<_>>(), vec!["_design/empty"]);
    }

    #[test]
    fn snapshot_is_shared_until_invalidated() {
        let b = bucket();
        b.set_ddoc("_design/users", USERS).unwrap();

        let first = b.get_ddocs().unwrap();
        let second = b.get_ddocs().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        b.set_ddoc("_design/users", USERS).unwrap();
        let third = b.get_ddocs().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn visit_ddocs_in_id_order() {
        let b = bucket();
        for id in ["_design/c", "_design/a", "_design/b"] {
            b.set_ddoc(id, b"{}").unwrap();
        }

        let mut ids = Vec::new();
        b.visit_ddocs(b"_design/b", |key, _| {
            ids.push(String::from_utf8(key.to_vec()).unwrap());
            true
        })
        .unwrap();
        assert_eq!(ids, vec!["_design/b", "_design/c"]);
    }

    #[test]
    fn ddoc_partition_is_not_a_slot() {
        let b = bucket();
        b.set_ddoc("_design/users", USERS).unwrap();
        let vb = b.ddoc_vbucket().unwrap();
        assert_eq!(vb.state(), VBState::Active);
        assert_eq!(vb.item_count(), 1);
        assert!(b.get_vbucket(crate::DDOC_VBID).is_none());
    }

    #[test]
    fn closed_bucket_hides_design_documents() {
        let b = bucket();
        assert!(b.set_ddoc("_design/users", USERS).unwrap());
        let held = Arc::clone(b.ddoc_vbucket().unwrap());
        b.close();

        assert!(b.ddoc_vbucket().is_none());
        assert!(!b.set_ddoc("_design/x", b"{}").unwrap());
        assert_eq!(b.get_ddoc("_design/users").unwrap(), None);
        assert_eq!(b.get_ddoc("_design/x").unwrap(), None);
        assert!(!b.delete_ddoc("_design/users").unwrap());
        assert!(b.get_ddocs().unwrap().is_empty());

        let mut visited = 0;
        b.visit_ddocs(b"", |_, _| {
            visited += 1;
            true
        })
        .unwrap();
        assert_eq!(visited, 0);

        // Nothing was written or removed behind the closed bucket.
        assert_eq!(held.item_count(), 1);
        assert!(held.get(b"_design/x").unwrap().value.is_none());
    }

    #[test]
    fn invalid_body_is_rejected_even_when_closed() {
        let b = bucket();
        b.close();
        assert!(matches!(
            b.set_ddoc("_design/bad", b"{not json"),
            Err(CoreError::InvalidDesignDoc { .. })
        ));
    }
}
