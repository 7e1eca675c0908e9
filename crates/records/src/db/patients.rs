//! Patient rows. Protected attributes arrive here already sealed.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;

/// Column values for an insert or whole-row update.
#[derive(Debug, Clone)]
pub struct SealedPatient {
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub gender: Option<&'static str>,
    pub address_enc: Option<Vec<u8>>,
    pub phone_enc: Option<Vec<u8>>,
    pub medical_history_enc: Option<Vec<u8>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PatientRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub gender: Option<String>,
    pub address_enc: Option<Vec<u8>>,
    pub phone_enc: Option<Vec<u8>>,
    pub medical_history_enc: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plaintext-searchable columns only; never touches envelopes.
#[derive(Debug, sqlx::FromRow)]
pub struct PatientSummaryRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub gender: Option<String>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    patient: &SealedPatient,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO patients (
            first_name, last_name, dob, gender,
            address_enc, phone_enc, medical_history_enc,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&patient.first_name)
    .bind(&patient.last_name)
    .bind(patient.dob)
    .bind(patient.gender)
    .bind(&patient.address_enc)
    .bind(&patient.phone_enc)
    .bind(&patient.medical_history_enc)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<PatientRow>, sqlx::Error> {
    sqlx::query_as::<_, PatientRow>(
        "SELECT id, first_name, last_name, dob, gender,
                address_enc, phone_enc, medical_history_enc,
                created_at, updated_at
         FROM patients WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn exists(conn: &mut SqliteConnection, id: i64) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM patients WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Case-insensitive substring match on first or last name, ordered by last name.
///
/// An empty query lists every patient. LIKE wildcards in `query` match literally.
pub async fn search(
    conn: &mut SqliteConnection,
    query: &str,
) -> Result<Vec<PatientSummaryRow>, sqlx::Error> {
    if query.is_empty() {
        return sqlx::query_as::<_, PatientSummaryRow>(
            "SELECT id, first_name, last_name, dob, gender
             FROM patients ORDER BY last_name, first_name, id",
        )
        .fetch_all(&mut *conn)
        .await;
    }

    let pattern = format!("%{}%", escape_like(query));
    sqlx::query_as::<_, PatientSummaryRow>(
        "SELECT id, first_name, last_name, dob, gender
         FROM patients
         WHERE first_name LIKE ? ESCAPE '\\' OR last_name LIKE ? ESCAPE '\\'
         ORDER BY last_name, first_name, id",
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(&mut *conn)
    .await
}

/// Replace every column of patient `id`. Returns `false` if no such patient.
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    patient: &SealedPatient,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE patients SET
            first_name = ?, last_name = ?, dob = ?, gender = ?,
            address_enc = ?, phone_enc = ?, medical_history_enc = ?,
            updated_at = ?
         WHERE id = ?",
    )
    .bind(&patient.first_name)
    .bind(&patient.last_name)
    .bind(patient.dob)
    .bind(patient.gender)
    .bind(&patient.address_enc)
    .bind(&patient.phone_enc)
    .bind(&patient.medical_history_enc)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete patient `id`. Its visits must already be gone.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM patients WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM patients")
        .fetch_one(&mut *conn)
        .await?;
    Ok(n)
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn sealed(first: &str, last: &str) -> SealedPatient {
        SealedPatient {
            first_name: first.into(),
            last_name: last.into(),
            dob: NaiveDate::from_ymd_opt(1980, 4, 2).unwrap(),
            gender: Some("other"),
            address_enc: Some(vec![1, 2, 3]),
            phone_enc: None,
            medical_history_enc: None,
        }
    }

    #[tokio::test]
    async fn insert_find_update_delete() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();

        let id = insert(&mut conn, &sealed("Ada", "Lovelace"), now).await.unwrap();
        let row = find(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(row.last_name, "Lovelace");
        assert_eq!(row.address_enc.as_deref(), Some(&[1u8, 2, 3][..]));
        assert!(row.phone_enc.is_none());

        let mut changed = sealed("Ada", "King");
        changed.address_enc = None;
        assert!(update(&mut conn, id, &changed, Utc::now()).await.unwrap());
        let row = find(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(row.last_name, "King");
        assert!(row.address_enc.is_none());

        assert!(delete(&mut conn, id).await.unwrap());
        assert!(!exists(&mut conn, id).await.unwrap());
        assert!(!update(&mut conn, id, &changed, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn search_matches_either_name_case_insensitively() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        insert(&mut conn, &sealed("Grace", "Hopper"), now).await.unwrap();
        insert(&mut conn, &sealed("Alan", "Turing"), now).await.unwrap();
        insert(&mut conn, &sealed("Hopkins", "Adams"), now).await.unwrap();

        let hits = search(&mut conn, "hop").await.unwrap();
        let names: Vec<_> = hits.iter().map(|r| r.last_name.as_str()).collect();
        assert_eq!(names, ["Adams", "Hopper"]);

        assert_eq!(search(&mut conn, "").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        insert(&mut conn, &sealed("Ann", "O_Neil"), Utc::now()).await.unwrap();
        insert(&mut conn, &sealed("Bob", "Oxneil"), Utc::now()).await.unwrap();

        let hits = search(&mut conn, "o_n").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].last_name, "O_Neil");
        assert!(search(&mut conn, "%").await.unwrap().is_empty());
    }

    #[test]
    fn escape_like_escapes_metacharacters() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
