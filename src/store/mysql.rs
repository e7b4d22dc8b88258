//! MySQL-backed student store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{ConnectOptions, MySql, MySqlPool, Transaction};
use tracing::{info, warn};

use crate::config::Config;
use crate::store::{NewStudent, Student, StudentPatch, StudentStore, StoreError};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS students (
    id INT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    student_id VARCHAR(10),
    fullname VARCHAR(100),
    dob DATE NULL,
    major VARCHAR(50) NULL
)";

const SELECT_ALL: &str = "SELECT id, student_id, fullname, dob, major FROM students ORDER BY id";
const SELECT_ONE: &str = "SELECT id, student_id, fullname, dob, major FROM students WHERE id = ?";
const SELECT_ONE_FOR_UPDATE: &str =
    "SELECT id, student_id, fullname, dob, major FROM students WHERE id = ? FOR UPDATE";
const INSERT: &str = "INSERT INTO students (student_id, fullname, dob, major) VALUES (?, ?, ?, ?)";
const UPDATE: &str =
    "UPDATE students SET student_id = ?, fullname = ?, dob = ?, major = ? WHERE id = ?";
const DELETE: &str = "DELETE FROM students WHERE id = ?";

/// The `MySQL` connector is also compatible with `MariaDB`.
#[derive(Clone)]
pub struct MySqlStudentStore {
    pool: MySqlPool,
}

impl MySqlStudentStore {
    /// Creates a lazily-connecting pool; no connection is opened here.
    pub fn new(config: &Config) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.db_host)
            .port(config.db_port)
            .username(&config.db_user)
            .password(&config.db_pass)
            .database(&config.db_name)
            // disable logging of each query
            .disable_statement_logging();

        let pool = MySqlPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy_with(options);

        Self { pool }
    }

    /// Creates the `students` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        info!("students table ready");
        Ok(())
    }

    async fn insert(
        tx: &mut Transaction<'_, MySql>,
        new: &NewStudent,
    ) -> Result<Student, sqlx::Error> {
        let result = sqlx::query(INSERT)
            .bind(&new.student_id)
            .bind(&new.fullname)
            .bind(new.dob)
            .bind(&new.major)
            .execute(&mut **tx)
            .await?;

        let id = i32::try_from(result.last_insert_id())
            .map_err(|e| sqlx::Error::Protocol(format!("inserted id out of range: {e}")))?;

        sqlx::query_as::<_, Student>(SELECT_ONE)
            .bind(id)
            .fetch_one(&mut **tx)
            .await
    }

    async fn patch(
        tx: &mut Transaction<'_, MySql>,
        id: i32,
        patch: &StudentPatch,
    ) -> Result<Option<Student>, sqlx::Error> {
        let Some(mut student) = sqlx::query_as::<_, Student>(SELECT_ONE_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
        else {
            return Ok(None);
        };

        patch.apply(&mut student);

        sqlx::query(UPDATE)
            .bind(&student.student_id)
            .bind(&student.fullname)
            .bind(student.dob)
            .bind(&student.major)
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(Some(student))
    }
}

/// Commits on success, rolls back on failure.
async fn finish<T>(
    tx: Transaction<'_, MySql>,
    result: Result<T, sqlx::Error>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Transaction rollback failed");
            }
            Err(err.into())
        }
    }
}

#[async_trait]
impl StudentStore for MySqlStudentStore {
    async fn create(&self, new: NewStudent) -> Result<Student, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = Self::insert(&mut tx, &new).await;
        finish(tx, result).await
    }

    async fn list(&self) -> Result<Vec<Student>, StoreError> {
        let students = sqlx::query_as::<_, Student>(SELECT_ALL)
            .fetch_all(&self.pool)
            .await?;
        Ok(students)
    }

    async fn get(&self, id: i32) -> Result<Option<Student>, StoreError> {
        let student = sqlx::query_as::<_, Student>(SELECT_ONE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    async fn update(&self, id: i32, patch: StudentPatch) -> Result<Option<Student>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = Self::patch(&mut tx, id, &patch).await;
        finish(tx, result).await
    }

    async fn delete(&self, id: i32) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(DELETE)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map(|done| done.rows_affected() > 0);
        finish(tx, result).await
    }
}
