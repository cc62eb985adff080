//! SQLite implementation of the discovery repositories

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::business::{Attribution, BusinessRecord};
use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::job::{Job, JobOptions, JobStatus, Source};
use crate::domain::repositories::{AttributionRepository, BusinessRepository, JobRepository};

const JOB_COLUMNS: &str = "id, keyword, location, radius_miles, sources, options, status, progress, \
     results_count, error_message, retry_count, started_at, completed_at, created_at, updated_at";

const BUSINESS_COLUMNS: &str =
    "id, name, address, phone, email, website, rating, review_count, attributes, created_at, updated_at";

// SQLite's lower() only folds ASCII, so names are matched on a key lowercased here
fn name_key(name: Option<&str>) -> Option<String> {
    name.map(str::to_lowercase)
}

const ATTRIBUTION_COLUMNS: &str =
    "id, job_id, business_id, source, confidence_score, search_term, search_position, created_at";

#[derive(Clone)]
pub struct SqliteDiscoveryStore {
    pool: SqlitePool,
}

impl SqliteDiscoveryStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(table: &'static str, value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::corrupt(table, format!("bad id '{value}': {e}")))
}

fn to_u32(table: &'static str, column: &str, value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::corrupt(table, format!("{column} out of range: {value}")))
}

fn job_from_row(row: &SqliteRow) -> StoreResult<Job> {
    let id: String = row.try_get("id")?;
    let sources: String = row.try_get("sources")?;
    let options: String = row.try_get("options")?;
    let status: String = row.try_get("status")?;
    let progress: i64 = row.try_get("progress")?;

    Ok(Job {
        id: parse_uuid("jobs", &id)?,
        keyword: row.try_get("keyword")?,
        location: row.try_get("location")?,
        radius_miles: to_u32("jobs", "radius_miles", row.try_get("radius_miles")?)?,
        sources: serde_json::from_str::<Vec<Source>>(&sources)?,
        options: serde_json::from_str::<JobOptions>(&options)?,
        status: status.parse::<JobStatus>().map_err(|e| StoreError::corrupt("jobs", e))?,
        progress: u8::try_from(progress.clamp(0, 100)).unwrap_or(100),
        results_count: to_u32("jobs", "results_count", row.try_get("results_count")?)?,
        error_message: row.try_get("error_message")?,
        retry_count: to_u32("jobs", "retry_count", row.try_get("retry_count")?)?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn business_from_row(row: &SqliteRow) -> StoreResult<BusinessRecord> {
    let id: String = row.try_get("id")?;
    let attributes: String = row.try_get("attributes")?;
    let review_count: Option<i64> = row.try_get("review_count")?;

    Ok(BusinessRecord {
        id: parse_uuid("businesses", &id)?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        website: row.try_get("website")?,
        rating: row.try_get("rating")?,
        review_count: review_count
            .map(|count| to_u32("businesses", "review_count", count))
            .transpose()?,
        attributes: serde_json::from_str(&attributes)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn attribution_from_row(row: &SqliteRow) -> StoreResult<Attribution> {
    let id: String = row.try_get("id")?;
    let job_id: String = row.try_get("job_id")?;
    let business_id: String = row.try_get("business_id")?;
    let source: String = row.try_get("source")?;

    Ok(Attribution {
        id: parse_uuid("job_results", &id)?,
        job_id: parse_uuid("job_results", &job_id)?,
        business_id: parse_uuid("job_results", &business_id)?,
        source: source
            .parse::<Source>()
            .map_err(|e| StoreError::corrupt("job_results", e.to_string()))?,
        confidence_score: row.try_get("confidence_score")?,
        search_term: row.try_get("search_term")?,
        search_position: to_u32("job_results", "search_position", row.try_get("search_position")?)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Escape LIKE wildcards so name terms match literally
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl JobRepository for SqliteDiscoveryStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(job.id.to_string())
            .bind(&job.keyword)
            .bind(&job.location)
            .bind(i64::from(job.radius_miles))
            .bind(serde_json::to_string(&job.sources)?)
            .bind(serde_json::to_string(&job.options)?)
            .bind(job.status.as_str())
            .bind(i64::from(job.progress))
            .bind(i64::from(job.results_count))
            .bind(&job.error_message)
            .bind(i64::from(job.retry_count))
            .bind(job.started_at)
            .bind(job.completed_at)
            .bind(job.created_at)
            .bind(job.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_job(&self, job_id: Uuid) -> StoreResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_job(&self, job: &Job) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE jobs SET
                keyword = ?, location = ?, radius_miles = ?, sources = ?, options = ?,
                status = ?, progress = ?, results_count = ?, error_message = ?,
                retry_count = ?, started_at = ?, completed_at = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(&job.keyword)
        .bind(&job.location)
        .bind(i64::from(job.radius_miles))
        .bind(serde_json::to_string(&job.sources)?)
        .bind(serde_json::to_string(&job.options)?)
        .bind(job.status.as_str())
        .bind(i64::from(job.progress))
        .bind(i64::from(job.results_count))
        .bind(&job.error_message)
        .bind(i64::from(job.retry_count))
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job.id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_jobs(&self, limit: u32) -> StoreResult<Vec<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }
}

#[async_trait]
impl BusinessRepository for SqliteDiscoveryStore {
    async fn find_by_phone(&self, phone: &str) -> StoreResult<Vec<BusinessRecord>> {
        let sql = format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE phone = ? ORDER BY created_at, rowid"
        );
        let rows = sqlx::query(&sql).bind(phone).fetch_all(&self.pool).await?;
        rows.iter().map(business_from_row).collect()
    }

    async fn find_name_candidates(&self, terms: &[String]) -> StoreResult<Vec<BusinessRecord>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let conditions = vec!["name_key LIKE ? ESCAPE '\\'"; terms.len()].join(" OR ");
        let sql = format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE name IS NOT NULL AND ({conditions}) \
             ORDER BY created_at, rowid"
        );

        let mut query = sqlx::query(&sql);
        for term in terms {
            query = query.bind(like_pattern(&term.to_lowercase()));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(business_from_row).collect()
    }

    async fn find_business(&self, business_id: Uuid) -> StoreResult<Option<BusinessRecord>> {
        let sql = format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(business_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(business_from_row).transpose()
    }

    async fn create_business(&self, record: &BusinessRecord) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO businesses ({BUSINESS_COLUMNS}, name_key) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(record.id.to_string())
            .bind(&record.name)
            .bind(&record.address)
            .bind(&record.phone)
            .bind(&record.email)
            .bind(&record.website)
            .bind(&record.rating)
            .bind(record.review_count.map(i64::from))
            .bind(serde_json::to_string(&record.attributes)?)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(name_key(record.name.as_deref()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_business(&self, record: &BusinessRecord) -> StoreResult<()> {
        // The phone column is only written while it is still empty
        let result = sqlx::query(
            r"
            UPDATE businesses SET
                name = ?, name_key = ?, address = ?,
                phone = CASE WHEN phone IS NULL OR phone = '' THEN ? ELSE phone END,
                email = ?, website = ?, rating = ?, review_count = ?, attributes = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(&record.name)
        .bind(name_key(record.name.as_deref()))
        .bind(&record.address)
        .bind(&record.phone)
        .bind(&record.email)
        .bind(&record.website)
        .bind(&record.rating)
        .bind(record.review_count.map(i64::from))
        .bind(serde_json::to_string(&record.attributes)?)
        .bind(record.updated_at)
        .bind(record.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "business",
                id: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn count_businesses(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl AttributionRepository for SqliteDiscoveryStore {
    async fn create_attribution(&self, attribution: &Attribution) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO job_results ({ATTRIBUTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(attribution.id.to_string())
            .bind(attribution.job_id.to_string())
            .bind(attribution.business_id.to_string())
            .bind(attribution.source.as_str())
            .bind(attribution.confidence_score)
            .bind(&attribution.search_term)
            .bind(i64::from(attribution.search_position))
            .bind(attribution.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_attributions_for_job(&self, job_id: Uuid) -> StoreResult<Vec<Attribution>> {
        let sql = format!(
            "SELECT {ATTRIBUTION_COLUMNS} FROM job_results WHERE job_id = ? ORDER BY created_at, rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(job_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(attribution_from_row).collect()
    }

    async fn find_attributions_for_business(&self, business_id: Uuid) -> StoreResult<Vec<Attribution>> {
        let sql = format!(
            "SELECT {ATTRIBUTION_COLUMNS} FROM job_results WHERE business_id = ? ORDER BY created_at, rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(business_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(attribution_from_row).collect()
    }
}
