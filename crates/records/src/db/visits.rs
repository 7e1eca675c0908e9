//! Visit rows, always addressed through their owning patient.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;

#[derive(Debug, Clone)]
pub struct SealedVisit {
    pub visit_date: NaiveDate,
    pub reason_enc: Option<Vec<u8>>,
    pub notes_enc: Option<Vec<u8>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct VisitRow {
    pub id: i64,
    pub patient_id: i64,
    pub clinician_id: Option<i64>,
    pub visit_date: NaiveDate,
    pub reason_enc: Option<Vec<u8>>,
    pub notes_enc: Option<Vec<u8>>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    patient_id: i64,
    clinician_id: i64,
    visit: &SealedVisit,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO visits (patient_id, clinician_id, visit_date, reason_enc, notes_enc, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(patient_id)
    .bind(clinician_id)
    .bind(visit.visit_date)
    .bind(&visit.reason_enc)
    .bind(&visit.notes_enc)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Fetch visit `visit_id` only if it belongs to `patient_id`.
pub async fn find_scoped(
    conn: &mut SqliteConnection,
    patient_id: i64,
    visit_id: i64,
) -> Result<Option<VisitRow>, sqlx::Error> {
    sqlx::query_as::<_, VisitRow>(
        "SELECT id, patient_id, clinician_id, visit_date, reason_enc, notes_enc
         FROM visits WHERE id = ? AND patient_id = ?",
    )
    .bind(visit_id)
    .bind(patient_id)
    .fetch_optional(&mut *conn)
    .await
}

/// All visits of a patient, most recent first.
pub async fn list_for_patient(
    conn: &mut SqliteConnection,
    patient_id: i64,
) -> Result<Vec<VisitRow>, sqlx::Error> {
    sqlx::query_as::<_, VisitRow>(
        "SELECT id, patient_id, clinician_id, visit_date, reason_enc, notes_enc
         FROM visits WHERE patient_id = ?
         ORDER BY visit_date DESC, id DESC",
    )
    .bind(patient_id)
    .fetch_all(&mut *conn)
    .await
}

/// Replace the date and envelopes of a visit scoped to its patient.
pub async fn update_scoped(
    conn: &mut SqliteConnection,
    patient_id: i64,
    visit_id: i64,
    visit: &SealedVisit,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE visits SET visit_date = ?, reason_enc = ?, notes_enc = ?
         WHERE id = ? AND patient_id = ?",
    )
    .bind(visit.visit_date)
    .bind(&visit.reason_enc)
    .bind(&visit.notes_enc)
    .bind(visit_id)
    .bind(patient_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_scoped(
    conn: &mut SqliteConnection,
    patient_id: i64,
    visit_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM visits WHERE id = ? AND patient_id = ?")
        .bind(visit_id)
        .bind(patient_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every visit of a patient, returning how many were removed.
pub async fn delete_for_patient(
    conn: &mut SqliteConnection,
    patient_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM visits WHERE patient_id = ?")
        .bind(patient_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits")
        .fetch_one(&mut *conn)
        .await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, patients};

    async fn patient(conn: &mut SqliteConnection, last: &str) -> i64 {
        let sealed = patients::SealedPatient {
            first_name: "Test".into(),
            last_name: last.into(),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: None,
            address_enc: None,
            phone_enc: None,
            medical_history_enc: None,
        };
        patients::insert(conn, &sealed, Utc::now()).await.unwrap()
    }

    fn visit(day: u32) -> SealedVisit {
        SealedVisit {
            visit_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            reason_enc: Some(vec![9; 4]),
            notes_enc: None,
        }
    }

    #[tokio::test]
    async fn scoped_lookups_ignore_other_patients() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let p1 = patient(&mut conn, "One").await;
        let p2 = patient(&mut conn, "Two").await;
        let v = insert(&mut conn, p2, 11, &visit(1), Utc::now()).await.unwrap();

        assert!(find_scoped(&mut conn, p1, v).await.unwrap().is_none());
        assert!(!update_scoped(&mut conn, p1, v, &visit(2)).await.unwrap());
        assert!(!delete_scoped(&mut conn, p1, v).await.unwrap());

        let row = find_scoped(&mut conn, p2, v).await.unwrap().unwrap();
        assert_eq!(row.clinician_id, Some(11));
        assert_eq!(row.visit_date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert!(delete_scoped(&mut conn, p2, v).await.unwrap());
        assert_eq!(count(&mut conn).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_delete_for_patient_counts() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let p = patient(&mut conn, "Many").await;
        for day in [3, 9, 5] {
            insert(&mut conn, p, 1, &visit(day), Utc::now()).await.unwrap();
        }

        let days: Vec<u32> = list_for_patient(&mut conn, p)
            .await
            .unwrap()
            .iter()
            .map(|v| chrono::Datelike::day(&v.visit_date))
            .collect();
        assert_eq!(days, [9, 5, 3]);

        assert_eq!(delete_for_patient(&mut conn, p).await.unwrap(), 3);
        assert!(list_for_patient(&mut conn, p).await.unwrap().is_empty());
    }
}
