use serde::Serialize;

/// Storage-independent column type.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer32,
    Text,
    TimestampWithOffset,
}

impl SemanticType {
    /// SQLite affinity used when rendering DDL. Timestamps are stored as RFC3339 text.
    pub fn sqlite_type(self) -> &'static str {
        match self {
            SemanticType::Integer32 => "INTEGER",
            SemanticType::Text | SemanticType::TimestampWithOffset => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub semantic_type: SemanticType,
    pub nullable: bool,
    pub max_length: Option<usize>,
    /// Value is generated by the storage layer on insert.
    pub identity: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrder {
    Asc,
    Desc,
}

impl IndexOrder {
    fn sql(self) -> &'static str {
        match self {
            IndexOrder::Asc => "ASC",
            IndexOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
    pub order: IndexOrder,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnDescriptor],
    pub primary_key: &'static [&'static str],
    pub indexes: &'static [IndexDescriptor],
}

/// Maximum length, in characters, of a deduplication key.
pub const DEDUPLICATION_KEY_MAX_LEN: usize = 100;

/// Shape of the `pagerduty_incident` table. Column order is the serialization order.
pub const PAGERDUTY_INCIDENT: TableSchema = TableSchema {
    name: "pagerduty_incident",
    columns: &[
        ColumnDescriptor {
            name: "id",
            semantic_type: SemanticType::Integer32,
            nullable: false,
            max_length: None,
            identity: true,
        },
        ColumnDescriptor {
            name: "uptime_event_id",
            semantic_type: SemanticType::Integer32,
            nullable: true,
            max_length: None,
            identity: false,
        },
        ColumnDescriptor {
            name: "ssl_event_id",
            semantic_type: SemanticType::Integer32,
            nullable: true,
            max_length: None,
            identity: false,
        },
        ColumnDescriptor {
            name: "deduplication_key",
            semantic_type: SemanticType::Text,
            nullable: false,
            max_length: Some(DEDUPLICATION_KEY_MAX_LEN),
            identity: false,
        },
        ColumnDescriptor {
            name: "started_at",
            semantic_type: SemanticType::TimestampWithOffset,
            nullable: false,
            max_length: None,
            identity: false,
        },
        ColumnDescriptor {
            name: "ended_at",
            semantic_type: SemanticType::TimestampWithOffset,
            nullable: true,
            max_length: None,
            identity: false,
        },
    ],
    primary_key: &["id"],
    indexes: &[
        IndexDescriptor {
            name: "pagerduty_incident_dedup_key_idx",
            columns: &["deduplication_key"],
            unique: true,
            order: IndexOrder::Asc,
        },
        IndexDescriptor {
            name: "pagerduty_incident_ended_at_idx",
            columns: &["ended_at"],
            unique: false,
            order: IndexOrder::Asc,
        },
        IndexDescriptor {
            name: "pagerduty_incident_ssl_event_idx",
            columns: &["ssl_event_id"],
            unique: false,
            order: IndexOrder::Asc,
        },
        IndexDescriptor {
            name: "pagerduty_incident_uptime_event_idx",
            columns: &["uptime_event_id"],
            unique: false,
            order: IndexOrder::Asc,
        },
    ],
};

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Columns the caller supplies on insert (everything except identity columns).
    pub fn insertable_columns(&self) -> impl Iterator<Item = &'static ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.identity)
    }

    pub fn unique_indexes(&self) -> impl Iterator<Item = &'static IndexDescriptor> {
        self.indexes.iter().filter(|i| i.unique)
    }

    pub fn secondary_indexes(&self) -> impl Iterator<Item = &'static IndexDescriptor> {
        self.indexes.iter().filter(|i| !i.unique)
    }

    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn column_sql(&self, column: &ColumnDescriptor) -> String {
        let mut sql = format!("{} {}", column.name, column.semantic_type.sqlite_type());
        if column.identity && self.primary_key == [column.name] {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(max) = column.max_length {
            sql.push_str(&format!(
                " CHECK (length({}) BETWEEN 1 AND {max})",
                column.name
            ));
        }
        sql
    }

    pub fn create_table_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(|c| self.column_sql(c)).collect();
        let single_identity_pk = self
            .columns
            .iter()
            .any(|c| c.identity && self.primary_key == [c.name]);
        if !single_identity_pk {
            parts.push(format!("PRIMARY KEY ({})", self.primary_key.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.name,
            parts.join(",\n  ")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|idx| {
                let cols = idx
                    .columns
                    .iter()
                    .map(|c| format!("{c} {}", idx.order.sql()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({cols})",
                    if idx.unique { "UNIQUE " } else { "" },
                    idx.name,
                    self.name
                )
            })
            .collect()
    }

    /// Full DDL script for SQLite: table first, then indexes.
    pub fn ddl(&self) -> String {
        let mut stmts = vec![self.create_table_sql()];
        stmts.extend(self.create_index_sql());
        let mut out = stmts.join(";\n");
        out.push_str(";\n");
        out
    }
}
