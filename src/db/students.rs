use rusqlite::{params, Connection, Error as SqlError, ErrorCode};

use crate::error::{BackendError, BackendResult};
use crate::models::Student;

/// Retrieve every student ordered by name, case-insensitively.
pub fn fetch_students(conn: &Connection) -> BackendResult<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT enrollment, name, birth_date, email, scholarship
         FROM students
         ORDER BY name COLLATE NOCASE, enrollment",
    )?;

    let students = stmt
        .query_map([], |row| {
            Ok(Student {
                enrollment: row.get(0)?,
                name: row.get(1)?,
                birth_date: row.get(2)?,
                email: row.get(3)?,
                scholarship: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

pub fn create_student(conn: &Connection, student: &Student) -> BackendResult<()> {
    conn.execute(
        "INSERT INTO students (enrollment, name, birth_date, email, scholarship)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            student.enrollment,
            student.name,
            student.birth_date,
            student.email,
            student.scholarship
        ],
    )
    .map_err(|err| map_constraint(err, &student.enrollment))?;
    Ok(())
}

/// Overwrite the editable columns of a student. The enrollment itself is the
/// key and stays as it was.
pub fn update_student(conn: &Connection, enrollment: &str, student: &Student) -> BackendResult<()> {
    let updated = conn.execute(
        "UPDATE students SET name = ?1, birth_date = ?2, email = ?3, scholarship = ?4
         WHERE enrollment = ?5",
        params![
            student.name,
            student.birth_date,
            student.email,
            student.scholarship,
            enrollment
        ],
    )?;

    if updated == 0 {
        Err(BackendError::NotFound(format!("Student {enrollment}")))
    } else {
        Ok(())
    }
}

pub fn delete_student(conn: &Connection, enrollment: &str) -> BackendResult<()> {
    let deleted = conn
        .execute("DELETE FROM students WHERE enrollment = ?1", params![enrollment])
        .map_err(|err| map_constraint(err, enrollment))?;

    if deleted == 0 {
        Err(BackendError::NotFound(format!("Student {enrollment}")))
    } else {
        Ok(())
    }
}

/// Turn the two constraints a student row can trip into readable messages:
/// a duplicate enrollment on insert, or loans still pointing at it on delete.
fn map_constraint(err: SqlError, enrollment: &str) -> BackendError {
    match err.sqlite_error() {
        Some(inner) if inner.code == ErrorCode::ConstraintViolation => {
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                BackendError::remote(format!("Student {enrollment} still has loans on record."))
            } else {
                BackendError::remote(format!("Enrollment {enrollment} already exists."))
            }
        }
        _ => err.into(),
    }
}
