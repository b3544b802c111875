use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use signoff_core::model::{ContributionKey, Visa, VisaRequest};
use surrealdb::{
    engine::any::{connect, Any},
    Surreal,
};

use crate::collab::{HistoryError, VisaHistoryStore};

/// Embedded SurrealDB handle.
#[derive(Clone)]
pub struct Db {
    inner: Surreal<Any>,
}

impl Db {
    /// Connect to an embedded SurrealKV datastore at `db_dir`.
    pub async fn connect(db_dir: &Path) -> anyhow::Result<Self> {
        let endpoint = format!("surrealkv://{}", db_dir.display());
        let db = connect(endpoint)
            .await
            .context("connecting to embedded SurrealKV")?;
        db.use_ns("signoff")
            .use_db("signoff")
            .await
            .context("selecting surreal namespace/db")?;
        Ok(Self { inner: db })
    }

    pub fn inner(&self) -> &Surreal<Any> {
        &self.inner
    }

    /// Apply schema at startup. Idempotent.
    pub async fn apply_schema(&self) -> anyhow::Result<()> {
        let schema = include_str!("../schema.surql");
        self.inner
            .query(schema)
            .await
            .context("applying schema")?
            .check()
            .context("applying schema")?;
        Ok(())
    }
}

/// Visa history persisted in the `visa_request` table, keyed by request id.
#[derive(Clone)]
pub struct SurrealVisaHistory {
    db: Db,
}

impl SurrealVisaHistory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VisaHistoryStore for SurrealVisaHistory {
    async fn append(&self, request: VisaRequest) -> Result<(), HistoryError> {
        self.db
            .inner()
            .query("CREATE type::thing('visa_request', $id) CONTENT $req RETURN NONE;")
            .bind(("id", request.request_id.clone()))
            .bind(("req", request))
            .await
            .context("append visa request")?
            .check()
            .context("append visa request")?;
        Ok(())
    }

    async fn last(&self, key: &ContributionKey) -> Result<Option<VisaRequest>, HistoryError> {
        let mut res = self
            .db
            .inner()
            .query(
                "SELECT * OMIT id FROM visa_request \
                 WHERE server_id = $server_id AND branch = $branch \
                 ORDER BY requested_at_ms DESC, request_id DESC LIMIT 1;",
            )
            .bind(("server_id", key.server_id.clone()))
            .bind(("branch", key.branch.clone()))
            .await
            .context("select last visa request")?;
        let rows: Vec<VisaRequest> = res.take(0).context("decode visa request")?;
        Ok(rows.into_iter().next())
    }

    async fn all(&self) -> Result<Vec<VisaRequest>, HistoryError> {
        let mut res = self
            .db
            .inner()
            .query(
                "SELECT * OMIT id FROM visa_request \
                 ORDER BY requested_at_ms ASC, request_id ASC;",
            )
            .await
            .context("select visa requests")?;
        let rows: Vec<VisaRequest> = res.take(0).context("decode visa requests")?;
        Ok(rows)
    }

    async fn complete(&self, request_id: &str, result: Option<Visa>) -> Result<(), HistoryError> {
        let mut res = self
            .db
            .inner()
            .query(
                "UPDATE type::thing('visa_request', $id) \
                 SET observing = false, result = $result \
                 WHERE observing = true \
                 RETURN VALUE request_id;",
            )
            .bind(("id", request_id.to_string()))
            .bind(("result", result))
            .await
            .context("complete visa request")?;
        let updated: Vec<String> = res.take(0).context("decode completion")?;
        if !updated.is_empty() {
            return Ok(());
        }

        let mut res = self
            .db
            .inner()
            .query("SELECT VALUE observing FROM type::thing('visa_request', $id);")
            .bind(("id", request_id.to_string()))
            .await
            .context("select visa request")?;
        let existing: Vec<bool> = res.take(0).context("decode visa request")?;
        if existing.is_empty() {
            Err(HistoryError::NotFound(request_id.to_string()))
        } else {
            Err(HistoryError::AlreadyCompleted(request_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, at: i64) -> VisaRequest {
        VisaRequest {
            request_id: id.into(),
            server_id: "apache".into(),
            branch: "pull/6224/head".into(),
            user_name: "dev".into(),
            ticket: "IGNITE-1".into(),
            build_type_id: "RunAll".into(),
            requested_at_ms: at,
            build_ids: vec![10, 11],
            observing: true,
            result: None,
        }
    }

    #[tokio::test]
    async fn surreal_history_round_trip() {
        let dir = std::env::temp_dir().join(format!("signoff-db-{}", signoff_core::new_ulid()));
        let db = Db::connect(&dir).await.unwrap();
        db.apply_schema().await.unwrap();
        let h = SurrealVisaHistory::new(db);

        h.append(request("01A", 1)).await.unwrap();
        h.append(request("01B", 2)).await.unwrap();

        let key = ContributionKey::new("apache", "pull/6224/head");
        assert_eq!(h.last(&key).await.unwrap().unwrap().request_id, "01B");

        h.complete("01B", Some(Visa::failed("no builds"))).await.unwrap();
        let all = h.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].observing);
        assert!(!all[1].observing);
        assert_eq!(all[1].result.as_ref().unwrap().status, "no builds");

        assert!(matches!(
            h.complete("01B", None).await,
            Err(HistoryError::AlreadyCompleted(_))
        ));
        assert!(matches!(
            h.complete("missing", None).await,
            Err(HistoryError::NotFound(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
