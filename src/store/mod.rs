//! Student records storage
//!
//! The handlers depend on the [`StudentStore`] trait; [`MySqlStudentStore`]
//! is the production implementation.

pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mysql::MySqlStudentStore;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query, connection or transaction failure
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// One row of the `students` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i32,
    pub student_id: Option<String>,
    pub fullname: Option<String>,
    pub dob: Option<NaiveDate>,
    pub major: Option<String>,
}

/// Fields of a record to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub student_id: String,
    pub fullname: String,
    pub major: Option<String>,
    pub dob: Option<NaiveDate>,
}

/// Partial update. The outer `Option` is "field present in the request",
/// the inner one is the new (possibly null) value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentPatch {
    pub student_id: Option<Option<String>>,
    pub fullname: Option<Option<String>>,
    pub major: Option<Option<String>>,
    pub dob: Option<Option<NaiveDate>>,
}

impl StudentPatch {
    /// Overwrites the fields present in the patch.
    pub fn apply(&self, student: &mut Student) {
        if let Some(fullname) = &self.fullname {
            student.fullname.clone_from(fullname);
        }
        if let Some(major) = &self.major {
            student.major.clone_from(major);
        }
        if let Some(student_id) = &self.student_id {
            student.student_id.clone_from(student_id);
        }
        if let Some(dob) = self.dob {
            student.dob = dob;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// CRUD access to student records.
#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Inserts a record and returns it with its assigned id.
    async fn create(&self, new: NewStudent) -> Result<Student, StoreError>;

    /// Returns every record.
    async fn list(&self) -> Result<Vec<Student>, StoreError>;

    /// Returns one record by primary key.
    async fn get(&self, id: i32) -> Result<Option<Student>, StoreError>;

    /// Applies `patch` to a record; `None` if it does not exist.
    async fn update(&self, id: i32, patch: StudentPatch) -> Result<Option<Student>, StoreError>;

    /// Deletes a record; `false` if it did not exist.
    async fn delete(&self, id: i32) -> Result<bool, StoreError>;
}
