use serde_json::Value;

use crate::resource::types::{NodeId, ResourceFilter, TenantId, RESOURCE_LINK};

use super::store::{CommandRecord, NewLink, NewNode, NodeChanges, NodeQuery, NodeScope};

/// Typed bind parameter. Arrays and nullable values need explicit types to bind
/// against Postgres, so these do not go through `serde_json::Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    BigInt(Option<i64>),
    Text(Option<String>),
    TextArray(Option<Vec<String>>),
    BigIntArray(Vec<i64>),
    Json(Option<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}

pub const NODE_COLUMNS: &str =
    "resource.id, resource.installation, resource.parent, resource.path::text AS path, \
     resource.name, resource.\"type\", resource.labels, resource.meta";

const LINK_COLUMNS: &str =
    "resource_link.id AS link_id, resource_link.parent AS link_parent, \
     resource_link.child AS link_child, resource_link.\"type\" AS link_type, \
     resource_link.meta AS link_meta";

/// Accumulates `AND ...` conditions with positional parameters
struct Conditions {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl Conditions {
    fn new() -> Self {
        Self { clauses: Vec::new(), params: Vec::new() }
    }

    fn next_index(&self) -> usize {
        self.params.len() + 1
    }

    fn push(&mut self, template: impl FnOnce(usize) -> String, param: SqlParam) {
        let clause = template(self.next_index());
        self.clauses.push(clause);
        self.params.push(param);
    }

    fn push_raw(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    fn filter(&mut self, filter: &ResourceFilter) {
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            self.push(
                |i| format!("lower(resource.name) LIKE lower(${i})"),
                SqlParam::Text(Some(format!("%{}%", escape_like(search)))),
            );
        }
        if let Some(node_type) = filter.node_type.as_deref().filter(|t| !t.is_empty()) {
            self.push(
                |i| format!("resource.\"type\" = ${i}"),
                SqlParam::Text(Some(node_type.to_string())),
            );
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn select_node(id: NodeId) -> SqlResult {
    SqlResult {
        query: format!("SELECT {NODE_COLUMNS} FROM resource WHERE resource.id = $1"),
        params: vec![SqlParam::BigInt(Some(id))],
    }
}

pub fn select_nodes(query: &NodeQuery) -> SqlResult {
    let mut conditions = Conditions::new();
    conditions.push(|i| format!("resource.installation = ${i}"), SqlParam::BigInt(Some(query.tenant)));

    match &query.scope {
        NodeScope::Tenant => {}
        NodeScope::Children(Some(parent)) => {
            conditions.push(|i| format!("resource.parent = ${i}"), SqlParam::BigInt(Some(*parent)));
        }
        NodeScope::Children(None) => conditions.push_raw("resource.parent IS NULL"),
        NodeScope::Descendants(prefix) => {
            conditions.push(
                |i| format!("resource.path <@ ${i}::ltree"),
                SqlParam::Text(Some(prefix.to_ltree())),
            );
        }
    }

    conditions.filter(&query.filter);

    SqlResult {
        query: format!(
            "SELECT {NODE_COLUMNS} FROM resource WHERE {} ORDER BY resource.name, resource.id",
            conditions.clauses.join(" AND ")
        ),
        params: conditions.params,
    }
}

pub fn insert_node(node: &NewNode) -> SqlResult {
    let mut columns = vec!["installation", "parent", "path", "name", "\"type\"", "labels", "meta"];
    let mut params = vec![
        SqlParam::BigInt(Some(node.tenant)),
        SqlParam::BigInt(node.parent),
        SqlParam::Text(Some(node.path.to_ltree())),
        SqlParam::Text(Some(node.name.clone())),
        SqlParam::Text(Some(node.node_type.clone())),
        SqlParam::TextArray(Some(node.labels.clone())),
        SqlParam::Json(Some(node.meta.clone())),
    ];
    if let Some(id) = node.id {
        columns.insert(0, "id");
        params.insert(0, SqlParam::BigInt(Some(id)));
    }

    let placeholders: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| match *column {
            "path" => format!("${}::ltree", i + 1),
            _ => format!("${}", i + 1),
        })
        .collect();

    SqlResult {
        query: format!(
            "INSERT INTO resource ({}) VALUES ({}) RETURNING {}",
            columns.join(", "),
            placeholders.join(", "),
            NODE_COLUMNS
        ),
        params,
    }
}

pub fn update_node(id: NodeId, changes: &NodeChanges) -> SqlResult {
    SqlResult {
        query: format!(
            "UPDATE resource SET \
             name = COALESCE($2, name), \
             \"type\" = COALESCE($3, \"type\"), \
             labels = COALESCE($4, labels), \
             meta = COALESCE($5, meta) \
             WHERE resource.id = $1 RETURNING {NODE_COLUMNS}"
        ),
        params: vec![
            SqlParam::BigInt(Some(id)),
            SqlParam::Text(changes.name.clone()),
            SqlParam::Text(changes.node_type.clone()),
            SqlParam::TextArray(changes.labels.clone()),
            SqlParam::Json(changes.meta.clone()),
        ],
    }
}

/// Descendants and links go with the row through `ON DELETE CASCADE`
pub fn delete_node(id: NodeId) -> SqlResult {
    SqlResult {
        query: format!("DELETE FROM resource WHERE resource.id = $1 RETURNING {NODE_COLUMNS}"),
        params: vec![SqlParam::BigInt(Some(id))],
    }
}

/// One query for all parents, joined with the child resource
pub fn select_links(tenant: TenantId, parents: &[NodeId]) -> SqlResult {
    SqlResult {
        query: format!(
            "SELECT {NODE_COLUMNS}, {LINK_COLUMNS} FROM resource \
             JOIN resource_link ON resource_link.child = resource.id \
             WHERE resource_link.\"type\" = $1 \
             AND resource_link.parent = ANY($2) \
             AND resource.installation = $3 \
             ORDER BY resource.name, resource_link.id"
        ),
        params: vec![
            SqlParam::Text(Some(RESOURCE_LINK.to_string())),
            SqlParam::BigIntArray(parents.to_vec()),
            SqlParam::BigInt(Some(tenant)),
        ],
    }
}

pub fn insert_link(link: &NewLink) -> SqlResult {
    SqlResult {
        query: "INSERT INTO resource_link (parent, child, \"type\", meta) VALUES ($1, $2, $3, $4) \
                RETURNING id, parent, child, \"type\", meta"
            .to_string(),
        params: vec![
            SqlParam::BigInt(Some(link.parent)),
            SqlParam::BigInt(Some(link.child)),
            SqlParam::Text(Some(link.kind.clone())),
            SqlParam::Json(Some(link.meta.clone())),
        ],
    }
}

pub fn delete_links(parent: NodeId) -> SqlResult {
    SqlResult {
        query: "DELETE FROM resource_link WHERE parent = $1".to_string(),
        params: vec![SqlParam::BigInt(Some(parent))],
    }
}

pub fn insert_command(record: &CommandRecord) -> SqlResult {
    SqlResult {
        query: "INSERT INTO command_log (installation, channel, data, created_at) VALUES ($1, $2, $3, $4::timestamptz)"
            .to_string(),
        params: vec![
            SqlParam::BigInt(Some(record.installation)),
            SqlParam::Text(Some(record.channel.clone())),
            SqlParam::Json(Some(record.data.clone())),
            SqlParam::Text(Some(record.created_at.to_rfc3339())),
        ],
    }
}

pub fn select_access_level(account: i64, installation: TenantId) -> SqlResult {
    SqlResult {
        query: "SELECT access FROM installation_access WHERE account = $1 AND installation = $2"
            .to_string(),
        params: vec![SqlParam::BigInt(Some(account)), SqlParam::BigInt(Some(installation))],
    }
}
