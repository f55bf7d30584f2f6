//! Ordered, idempotent schema migrations.
//!
//! Every statement may run against a database at any earlier revision, so
//! tables are created with `IF NOT EXISTS`, later columns are added with
//! `ADD COLUMN IF NOT EXISTS` and constraints are guarded by a catalog lookup.

use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "create_grids",
        sql: r#"
            CREATE TABLE IF NOT EXISTS grids (
                id SERIAL PRIMARY KEY,
                name TEXT,
                base_mva DOUBLE PRECISION,
                raw_json JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    },
    Migration {
        name: "grids_tmp_file_path",
        sql: "ALTER TABLE grids ADD COLUMN IF NOT EXISTS tmp_file_path TEXT",
    },
    Migration {
        name: "create_buses",
        sql: r#"
            CREATE TABLE IF NOT EXISTS buses (
                id SERIAL PRIMARY KEY,
                grid_id INTEGER NOT NULL REFERENCES grids(id) ON DELETE CASCADE,
                idtag TEXT NOT NULL,
                name TEXT,
                code TEXT,
                vnom DOUBLE PRECISION,
                vm0 DOUBLE PRECISION,
                va0 DOUBLE PRECISION,
                x DOUBLE PRECISION,
                y DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                latitude DOUBLE PRECISION,
                is_slack BOOLEAN,
                UNIQUE (grid_id, idtag)
            )
        "#,
    },
    Migration {
        name: "buses_extended_columns",
        sql: r#"
            ALTER TABLE buses
                ADD COLUMN IF NOT EXISTS active BOOLEAN,
                ADD COLUMN IF NOT EXISTS is_dc BOOLEAN,
                ADD COLUMN IF NOT EXISTS graphic_type TEXT,
                ADD COLUMN IF NOT EXISTS vmin DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS vmax DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS vm_cost DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS angle_min DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS angle_max DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS angle_cost DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS r_fault DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS x_fault DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS h DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS w DOUBLE PRECISION,
                ADD COLUMN IF NOT EXISTS country TEXT,
                ADD COLUMN IF NOT EXISTS area TEXT,
                ADD COLUMN IF NOT EXISTS zone TEXT,
                ADD COLUMN IF NOT EXISTS substation TEXT,
                ADD COLUMN IF NOT EXISTS voltage_level TEXT,
                ADD COLUMN IF NOT EXISTS bus_bar TEXT,
                ADD COLUMN IF NOT EXISTS ph_a BOOLEAN,
                ADD COLUMN IF NOT EXISTS ph_b BOOLEAN,
                ADD COLUMN IF NOT EXISTS ph_c BOOLEAN,
                ADD COLUMN IF NOT EXISTS ph_n BOOLEAN,
                ADD COLUMN IF NOT EXISTS is_grounded BOOLEAN,
                ADD COLUMN IF NOT EXISTS active_prof JSONB,
                ADD COLUMN IF NOT EXISTS vmin_prof JSONB,
                ADD COLUMN IF NOT EXISTS vmax_prof JSONB
        "#,
    },
    Migration {
        name: "create_loads",
        sql: r#"
            CREATE TABLE IF NOT EXISTS loads (
                id SERIAL PRIMARY KEY,
                grid_id INTEGER NOT NULL REFERENCES grids(id) ON DELETE CASCADE,
                idtag TEXT NOT NULL,
                name TEXT,
                code TEXT,
                bus_idtag TEXT NOT NULL,
                active BOOLEAN,
                p DOUBLE PRECISION,
                q DOUBLE PRECISION,
                conn TEXT,
                longitude DOUBLE PRECISION,
                latitude DOUBLE PRECISION,
                UNIQUE (grid_id, idtag),
                FOREIGN KEY (grid_id, bus_idtag) REFERENCES buses(grid_id, idtag) ON DELETE CASCADE
            )
        "#,
    },
    Migration {
        name: "create_generators",
        sql: r#"
            CREATE TABLE IF NOT EXISTS generators (
                id SERIAL PRIMARY KEY,
                grid_id INTEGER NOT NULL REFERENCES grids(id) ON DELETE CASCADE,
                idtag TEXT NOT NULL,
                name TEXT,
                code TEXT,
                bus_idtag TEXT NOT NULL,
                active BOOLEAN,
                p DOUBLE PRECISION,
                vset DOUBLE PRECISION,
                qmin DOUBLE PRECISION,
                qmax DOUBLE PRECISION,
                pf DOUBLE PRECISION,
                UNIQUE (grid_id, idtag),
                FOREIGN KEY (grid_id, bus_idtag) REFERENCES buses(grid_id, idtag) ON DELETE CASCADE
            )
        "#,
    },
    Migration {
        name: "create_shunts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS shunts (
                id SERIAL PRIMARY KEY,
                grid_id INTEGER NOT NULL REFERENCES grids(id) ON DELETE CASCADE,
                idtag TEXT NOT NULL,
                name TEXT,
                code TEXT,
                bus_idtag TEXT NOT NULL,
                active BOOLEAN,
                b DOUBLE PRECISION,
                UNIQUE (grid_id, idtag),
                FOREIGN KEY (grid_id, bus_idtag) REFERENCES buses(grid_id, idtag) ON DELETE CASCADE
            )
        "#,
    },
    Migration {
        name: "create_transformers2w",
        sql: r#"
            CREATE TABLE IF NOT EXISTS transformers2w (
                id SERIAL PRIMARY KEY,
                grid_id INTEGER NOT NULL REFERENCES grids(id) ON DELETE CASCADE,
                idtag TEXT NOT NULL,
                name TEXT,
                code TEXT,
                bus_from_idtag TEXT NOT NULL,
                bus_to_idtag TEXT NOT NULL,
                active BOOLEAN,
                r DOUBLE PRECISION,
                x DOUBLE PRECISION,
                g DOUBLE PRECISION,
                b DOUBLE PRECISION,
                hv DOUBLE PRECISION,
                lv DOUBLE PRECISION,
                sn DOUBLE PRECISION,
                UNIQUE (grid_id, idtag),
                FOREIGN KEY (grid_id, bus_from_idtag) REFERENCES buses(grid_id, idtag) ON DELETE CASCADE,
                FOREIGN KEY (grid_id, bus_to_idtag) REFERENCES buses(grid_id, idtag) ON DELETE CASCADE
            )
        "#,
    },
    Migration {
        name: "create_lines",
        sql: r#"
            CREATE TABLE IF NOT EXISTS lines (
                id SERIAL PRIMARY KEY,
                grid_id INTEGER NOT NULL REFERENCES grids(id) ON DELETE CASCADE,
                idtag TEXT NOT NULL,
                name TEXT,
                code TEXT,
                bus_from_idtag TEXT NOT NULL,
                bus_to_idtag TEXT NOT NULL,
                active BOOLEAN,
                r DOUBLE PRECISION,
                x DOUBLE PRECISION,
                b DOUBLE PRECISION,
                length DOUBLE PRECISION,
                UNIQUE (grid_id, idtag),
                FOREIGN KEY (grid_id, bus_from_idtag) REFERENCES buses(grid_id, idtag) ON DELETE CASCADE,
                FOREIGN KEY (grid_id, bus_to_idtag) REFERENCES buses(grid_id, idtag) ON DELETE CASCADE
            )
        "#,
    },
    Migration {
        name: "element_grid_foreign_keys",
        sql: r#"
            DO $$
            DECLARE
                tbl TEXT;
            BEGIN
                FOREACH tbl IN ARRAY ARRAY['buses', 'loads', 'generators', 'shunts', 'transformers2w', 'lines']
                LOOP
                    IF NOT EXISTS (
                        SELECT 1
                        FROM pg_constraint c
                        JOIN pg_class t ON t.oid = c.conrelid
                        WHERE t.relname = tbl
                          AND c.conname IN ('fk_' || tbl || '_grid', tbl || '_grid_id_fkey')
                    ) THEN
                        EXECUTE format(
                            'ALTER TABLE %I ADD CONSTRAINT %I FOREIGN KEY (grid_id) REFERENCES grids(id) ON DELETE CASCADE',
                            tbl, 'fk_' || tbl || '_grid'
                        );
                    END IF;
                END LOOP;
            END$$
        "#,
    },
];

/// Apply every migration in order inside one transaction.
pub async fn ensure_schema(pool: &PgPool) -> StoreResult<()> {
    let mut tx = pool.begin().await?;
    for migration in MIGRATIONS {
        debug!(migration = migration.name, "applying");
        sqlx::query(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|source| StoreError::Migration {
                name: migration.name,
                source,
            })?;
    }
    tx.commit().await?;
    info!(count = MIGRATIONS.len(), "schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = MIGRATIONS.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), MIGRATIONS.len());
    }

    #[test]
    fn test_statements_are_rerunnable() {
        for m in MIGRATIONS {
            let sql = m.sql.to_ascii_uppercase();
            let guarded = sql.contains("IF NOT EXISTS");
            assert!(guarded, "{} is not idempotent", m.name);
        }
    }

    #[test]
    fn test_parents_before_children() {
        let pos = |name: &str| MIGRATIONS.iter().position(|m| m.name == name).unwrap();
        assert!(pos("create_grids") < pos("create_buses"));
        for child in ["create_loads", "create_generators", "create_shunts", "create_lines"] {
            assert!(pos("create_buses") < pos(child));
        }
    }
}
