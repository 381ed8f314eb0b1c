mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::*;
use crate::service::{CohortService, LocationService};

const COHORT_SELECT: &str = "SELECT c.uuid, c.name, c.description, c.start_date, c.end_date,
        c.group_cohort, c.voided, c.void_reason, c.date_created, c.date_changed, c.date_voided,
        l.id, l.uuid, l.name, l.description, l.retired,
        t.uuid, t.name, t.description
     FROM cohorts c
     LEFT JOIN locations l ON l.id = c.location_id
     LEFT JOIN cohort_types t ON t.uuid = c.cohort_type_uuid";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "cohort-rest")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("cohorts.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Location operations
    // ============================================================

    pub fn create_location(&self, input: CreateLocationInput) -> Result<Location> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let uuid = Uuid::new_v4();

        conn.execute(
            "INSERT INTO locations (uuid, name, description, retired) VALUES (?, ?, ?, 0)",
            (uuid.to_string(), &input.name, &input.description),
        )?;

        Ok(Location {
            id: conn.last_insert_rowid(),
            uuid,
            name: input.name,
            description: input.description,
            retired: false,
        })
    }

    pub fn get_all_locations(&self) -> Result<Vec<Location>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, uuid, name, description, retired FROM locations ORDER BY name",
        )?;

        let locations = stmt
            .query_map([], |row| {
                Ok(Location {
                    id: row.get(0)?,
                    uuid: parse_uuid(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    description: row.get(3)?,
                    retired: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(locations)
    }

    // ============================================================
    // Cohort type operations
    // ============================================================

    pub fn create_cohort_type(&self, input: CreateCohortTypeInput) -> Result<CohortType> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let uuid = Uuid::new_v4();

        conn.execute(
            "INSERT INTO cohort_types (uuid, name, description) VALUES (?, ?, ?)",
            (uuid.to_string(), &input.name, &input.description),
        )?;

        Ok(CohortType {
            uuid,
            name: input.name,
            description: input.description,
        })
    }

    pub fn get_all_cohort_types(&self) -> Result<Vec<CohortType>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt =
            conn.prepare("SELECT uuid, name, description FROM cohort_types ORDER BY name")?;

        let types = stmt
            .query_map([], |row| {
                Ok(CohortType {
                    uuid: parse_uuid(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(types)
    }

    // ============================================================
    // Cohort attribute type operations
    // ============================================================

    pub fn create_cohort_attribute_type(
        &self,
        input: CreateCohortAttributeTypeInput,
    ) -> Result<CohortAttributeType> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let uuid = Uuid::new_v4();

        conn.execute(
            "INSERT INTO cohort_attribute_types (uuid, name, description) VALUES (?, ?, ?)",
            (uuid.to_string(), &input.name, &input.description),
        )?;

        Ok(CohortAttributeType {
            uuid,
            name: input.name,
            description: input.description,
        })
    }

    pub fn get_all_cohort_attribute_types(&self) -> Result<Vec<CohortAttributeType>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn
            .prepare("SELECT uuid, name, description FROM cohort_attribute_types ORDER BY name")?;

        let types = stmt
            .query_map([], |row| {
                Ok(CohortAttributeType {
                    uuid: parse_uuid(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(types)
    }
}

// ============================================================
// Cohort operations
// ============================================================

impl CohortService for Database {
    fn save_cohort(&self, cohort: Cohort) -> Result<Cohort> {
        let uuid = cohort.uuid.to_string();
        {
            let mut conn = self.conn.lock().expect("database lock poisoned");
            let tx = conn.transaction()?;
            let now = Utc::now();

            let existing_created: Option<String> = tx
                .query_row(
                    "SELECT date_created FROM cohorts WHERE uuid = ?",
                    [&uuid],
                    |row| row.get(0),
                )
                .optional()?;

            let date_changed = existing_created.as_ref().map(|_| now);
            let date_created = existing_created.map(parse_datetime).unwrap_or(now);
            let date_voided = if cohort.voided {
                Some(cohort.audit_info.date_voided.unwrap_or(now))
            } else {
                None
            };

            tx.execute(
                "INSERT INTO cohorts (uuid, name, description, location_id, cohort_type_uuid,
                     start_date, end_date, group_cohort, voided, void_reason,
                     date_created, date_changed, date_voided)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(uuid) DO UPDATE SET
                     name = excluded.name,
                     description = excluded.description,
                     location_id = excluded.location_id,
                     cohort_type_uuid = excluded.cohort_type_uuid,
                     start_date = excluded.start_date,
                     end_date = excluded.end_date,
                     group_cohort = excluded.group_cohort,
                     voided = excluded.voided,
                     void_reason = excluded.void_reason,
                     date_changed = excluded.date_changed,
                     date_voided = excluded.date_voided",
                params![
                    &uuid,
                    &cohort.name,
                    &cohort.description,
                    cohort.location.as_ref().map(|l| l.id),
                    cohort.cohort_type.as_ref().map(|t| t.uuid.to_string()),
                    cohort.start_date.map(|d| d.to_rfc3339()),
                    cohort.end_date.map(|d| d.to_rfc3339()),
                    cohort.group_cohort,
                    cohort.voided,
                    &cohort.void_reason,
                    date_created.to_rfc3339(),
                    date_changed.map(|d| d.to_rfc3339()),
                    date_voided.map(|d| d.to_rfc3339()),
                ],
            )?;

            tx.execute("DELETE FROM cohort_members WHERE cohort_uuid = ?", [&uuid])?;
            for member in &cohort.cohort_members {
                tx.execute(
                    "INSERT INTO cohort_members (uuid, cohort_uuid, patient_uuid, start_date, end_date, voided, void_reason)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    (
                        member.uuid.to_string(),
                        &uuid,
                        member.patient_uuid.to_string(),
                        member.start_date.map(|d| d.to_rfc3339()),
                        member.end_date.map(|d| d.to_rfc3339()),
                        member.voided,
                        &member.void_reason,
                    ),
                )?;
            }

            tx.execute("DELETE FROM cohort_attributes WHERE cohort_uuid = ?", [&uuid])?;
            for attribute in &cohort.attributes {
                tx.execute(
                    "INSERT INTO cohort_attributes (uuid, cohort_uuid, attribute_type_uuid, value, voided)
                     VALUES (?, ?, ?, ?, ?)",
                    (
                        attribute.uuid.to_string(),
                        &uuid,
                        attribute.attribute_type.uuid.to_string(),
                        &attribute.value,
                        attribute.voided,
                    ),
                )?;
            }

            tx.commit()?;
        }

        tracing::debug!("Saved cohort {}", uuid);

        self.get_cohort_by_uuid(&uuid)?
            .ok_or_else(|| anyhow::anyhow!("Cohort {} not found after save", uuid))
    }

    fn purge_cohort(&self, cohort: &Cohort) -> Result<()> {
        let uuid = cohort.uuid.to_string();
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM cohort_members WHERE cohort_uuid = ?", [&uuid])?;
        tx.execute("DELETE FROM cohort_attributes WHERE cohort_uuid = ?", [&uuid])?;
        tx.execute("DELETE FROM cohorts WHERE uuid = ?", [&uuid])?;

        tx.commit()?;
        Ok(())
    }

    fn get_cohort_by_uuid(&self, uuid: &str) -> Result<Option<Cohort>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let sql = format!("{} WHERE c.uuid = ?", COHORT_SELECT);
        let cohorts = query_cohorts(&conn, &sql, [uuid])?;
        Ok(cohorts.into_iter().next())
    }

    fn get_all_cohorts(&self) -> Result<Vec<Cohort>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let sql = format!("{} WHERE c.voided = 0 ORDER BY c.name", COHORT_SELECT);
        query_cohorts(&conn, &sql, params![])
    }

    fn get_cohort_type_by_name(&self, name: &str) -> Result<Option<CohortType>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.query_row(
            "SELECT uuid, name, description FROM cohort_types WHERE name = ?",
            [name],
            cohort_type_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_cohort_type_by_uuid(&self, uuid: &str) -> Result<Option<CohortType>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.query_row(
            "SELECT uuid, name, description FROM cohort_types WHERE uuid = ?",
            [uuid],
            cohort_type_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_cohorts_by_location_id(&self, location_id: i64) -> Result<Vec<Cohort>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let sql = format!(
            "{} WHERE c.voided = 0 AND c.location_id = ? ORDER BY c.name",
            COHORT_SELECT
        );
        query_cohorts(&conn, &sql, [location_id])
    }

    fn find_cohorts_matching(
        &self,
        query: Option<&str>,
        attributes: Option<&HashMap<String, String>>,
        cohort_type: Option<&CohortType>,
    ) -> Result<Vec<Cohort>> {
        let mut sql = format!("{} WHERE c.voided = 0", COHORT_SELECT);
        let mut args: Vec<String> = Vec::new();

        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            sql.push_str(" AND (c.name LIKE ? ESCAPE '\\' OR c.description LIKE ? ESCAPE '\\')");
            let pattern = format!("%{}%", escape_like(q));
            args.push(pattern.clone());
            args.push(pattern);
        }

        if let Some(attributes) = attributes {
            // Sorted so the generated SQL is stable across calls.
            let mut pairs: Vec<_> = attributes.iter().collect();
            pairs.sort();
            for (name, value) in pairs {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM cohort_attributes a
                        JOIN cohort_attribute_types at ON at.uuid = a.attribute_type_uuid
                        WHERE a.cohort_uuid = c.uuid AND a.voided = 0
                          AND at.name = ? AND a.value = ?)",
                );
                args.push(name.clone());
                args.push(value.clone());
            }
        }

        if let Some(cohort_type) = cohort_type {
            sql.push_str(" AND c.cohort_type_uuid = ?");
            args.push(cohort_type.uuid.to_string());
        }

        sql.push_str(" ORDER BY c.name");

        let conn = self.conn.lock().expect("database lock poisoned");
        query_cohorts(&conn, &sql, rusqlite::params_from_iter(args.iter()))
    }

    fn get_cohort_attribute_type_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<Option<CohortAttributeType>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.query_row(
            "SELECT uuid, name, description FROM cohort_attribute_types WHERE uuid = ?",
            [uuid],
            |row| {
                Ok(CohortAttributeType {
                    uuid: parse_uuid(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

impl LocationService for Database {
    fn get_location_by_uuid(&self, uuid: &str) -> Result<Option<Location>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.query_row(
            "SELECT id, uuid, name, description, retired FROM locations WHERE uuid = ?",
            [uuid],
            |row| {
                Ok(Location {
                    id: row.get(0)?,
                    uuid: parse_uuid(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    description: row.get(3)?,
                    retired: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

// ============================================================
// Row mapping
// ============================================================

/// Run a query selecting [`COHORT_SELECT`] columns and load each cohort's
/// members and attributes.
fn query_cohorts<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Cohort>> {
    let mut stmt = conn.prepare(sql)?;
    let mut cohorts = stmt
        .query_map(params, cohort_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for cohort in &mut cohorts {
        let uuid = cohort.uuid.to_string();
        cohort.cohort_members = load_members(conn, &uuid)?;
        cohort.attributes = load_attributes(conn, &uuid)?;
    }

    Ok(cohorts)
}

fn cohort_from_row(row: &Row<'_>) -> rusqlite::Result<Cohort> {
    let location = match row.get::<_, Option<i64>>(11)? {
        Some(id) => Some(Location {
            id,
            uuid: parse_uuid(row.get::<_, String>(12)?),
            name: row.get(13)?,
            description: row.get(14)?,
            retired: row.get(15)?,
        }),
        None => None,
    };

    let cohort_type = match row.get::<_, Option<String>>(16)? {
        Some(uuid) => Some(CohortType {
            uuid: parse_uuid(uuid),
            name: row.get(17)?,
            description: row.get(18)?,
        }),
        None => None,
    };

    Ok(Cohort {
        uuid: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        start_date: row.get::<_, Option<String>>(3)?.map(parse_datetime),
        end_date: row.get::<_, Option<String>>(4)?.map(parse_datetime),
        location,
        cohort_type,
        attributes: Vec::new(),
        cohort_members: Vec::new(),
        group_cohort: row.get(5)?,
        voided: row.get(6)?,
        void_reason: row.get(7)?,
        audit_info: AuditInfo {
            date_created: Some(parse_datetime(row.get::<_, String>(8)?)),
            date_changed: row.get::<_, Option<String>>(9)?.map(parse_datetime),
            date_voided: row.get::<_, Option<String>>(10)?.map(parse_datetime),
        },
    })
}

fn cohort_type_from_row(row: &Row<'_>) -> rusqlite::Result<CohortType> {
    Ok(CohortType {
        uuid: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn load_members(conn: &Connection, cohort_uuid: &str) -> Result<Vec<CohortMember>> {
    let mut stmt = conn.prepare(
        "SELECT uuid, patient_uuid, start_date, end_date, voided, void_reason
         FROM cohort_members WHERE cohort_uuid = ? ORDER BY rowid",
    )?;

    let members = stmt
        .query_map([cohort_uuid], |row| {
            Ok(CohortMember {
                uuid: parse_uuid(row.get::<_, String>(0)?),
                patient_uuid: parse_uuid(row.get::<_, String>(1)?),
                start_date: row.get::<_, Option<String>>(2)?.map(parse_datetime),
                end_date: row.get::<_, Option<String>>(3)?.map(parse_datetime),
                voided: row.get(4)?,
                void_reason: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(members)
}

fn load_attributes(conn: &Connection, cohort_uuid: &str) -> Result<Vec<CohortAttribute>> {
    let mut stmt = conn.prepare(
        "SELECT a.uuid, a.value, a.voided, at.uuid, at.name, at.description
         FROM cohort_attributes a
         JOIN cohort_attribute_types at ON at.uuid = a.attribute_type_uuid
         WHERE a.cohort_uuid = ? ORDER BY a.rowid",
    )?;

    let attributes = stmt
        .query_map([cohort_uuid], |row| {
            Ok(CohortAttribute {
                uuid: parse_uuid(row.get::<_, String>(0)?),
                value: row.get(1)?,
                voided: row.get(2)?,
                attribute_type: CohortAttributeType {
                    uuid: parse_uuid(row.get::<_, String>(3)?),
                    name: row.get(4)?,
                    description: row.get(5)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(attributes)
}

/// Escape `LIKE` wildcards so the query text matches literally.
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
