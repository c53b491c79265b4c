//! Copy and cut of whole subtrees.
//!
//! A paste loads every source subtree, strips it down to payloads, deletes
//! the originals when cutting, then re-creates the payloads under the
//! destination. All of it runs on the caller's transaction, so any failure
//! leaves storage untouched once the caller rolls back.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::database::store::Store;
use crate::events::{Event, EventError, EventSink};

use super::error::ResourceError;
use super::path::is_descendant;
use super::store::ResourceStore;
use super::types::{Node, NodeId, NodePayload, TenantId};

pub const PASTE_CHANNEL: &str = "resource.paste";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasteMode {
    Copy,
    Cut,
}

impl PasteMode {
    /// A cut re-creates nodes under their original ids
    fn keeps_ids(self) -> bool {
        matches!(self, PasteMode::Cut)
    }
}

impl FromStr for PasteMode {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copy" => Ok(PasteMode::Copy),
            "cut" => Ok(PasteMode::Cut),
            other => Err(ResourceError::validation(format!("unknown paste mode '{}'", other))),
        }
    }
}

impl fmt::Display for PasteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PasteMode::Copy => "copy",
            PasteMode::Cut => "cut",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasteRequest {
    pub mode: PasteMode,
    pub ids: Vec<NodeId>,
    /// Destination; `None` pastes at the tenant root
    pub parent: Option<NodeId>,
}

impl PasteRequest {
    pub fn new(mode: PasteMode, ids: Vec<NodeId>, parent: Option<NodeId>) -> Self {
        Self { mode, ids, parent }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PasteResult {
    /// Source subtrees as loaded
    pub original_items: Vec<Node>,
    /// Stripped payloads that were inserted
    pub source_items: Vec<NodePayload>,
    /// Source roots removed by a cut
    pub deleted_items: Vec<Node>,
    /// Newly created subtrees
    pub target_items: Vec<Node>,
}

/// Runs a paste for `tenant` and reports it to `sink`
pub async fn paste(
    store: &mut dyn Store,
    sink: &dyn EventSink,
    tenant: TenantId,
    request: &PasteRequest,
) -> Result<PasteResult, ResourceError> {
    let ids = distinct(&request.ids);
    if ids.is_empty() {
        return Err(ResourceError::validation("no copy or cut ids passed"));
    }

    let mut resources = ResourceStore::new(&mut *store, tenant);

    let destination = match request.parent {
        Some(id) => Some(resources.require(id).await?),
        None => None,
    };

    let mut originals = Vec::with_capacity(ids.len());
    for &id in &ids {
        let mut item = resources.require(id).await?;
        item.children = resources.tree(Some(id)).await?;
        originals.push(item);
    }
    check_placement(&originals, destination.as_ref(), request.mode)?;

    let sources: Vec<NodePayload> = originals
        .iter()
        .map(|item| strip(item, request.mode.keeps_ids()))
        .collect();

    let mut deleted = Vec::new();
    if request.mode == PasteMode::Cut {
        for item in &originals {
            deleted.push(resources.delete(item.id).await?);
        }
        debug!(count = deleted.len(), "cut removed source subtrees");
    }

    let mut targets = Vec::with_capacity(sources.len());
    for item in &sources {
        targets.push(resources.create(request.parent, item.clone()).await?);
    }

    let result = PasteResult {
        original_items: originals,
        source_items: sources,
        deleted_items: deleted,
        target_items: targets,
    };

    let event = Event::command(
        PASTE_CHANNEL,
        tenant,
        serde_json::to_value(request).map_err(EventError::from)?,
        serde_json::to_value(&result).map_err(EventError::from)?,
    );
    sink.emit(store, &event).await?;

    info!(
        installation = tenant,
        mode = %request.mode,
        items = result.target_items.len(),
        "paste complete"
    );
    Ok(result)
}

fn distinct(ids: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn check_placement(
    sources: &[Node],
    destination: Option<&Node>,
    mode: PasteMode,
) -> Result<(), ResourceError> {
    for inner in sources {
        if let Some(outer) = sources
            .iter()
            .find(|outer| outer.id != inner.id && is_descendant(&inner.path, outer.id))
        {
            return Err(ResourceError::constraint(format!(
                "resource {} is inside pasted resource {}",
                inner.id, outer.id
            )));
        }
    }

    if let (PasteMode::Cut, Some(dest)) = (mode, destination) {
        if let Some(source) = sources
            .iter()
            .find(|s| s.id == dest.id || is_descendant(&dest.path, s.id))
        {
            return Err(ResourceError::constraint(format!(
                "cannot move resource {} into its own subtree",
                source.id
            )));
        }
    }
    Ok(())
}

/// Reduces a loaded subtree to a payload tree without placement fields
fn strip(root: &Node, keep_ids: bool) -> NodePayload {
    let mut slots: Vec<Option<NodePayload>> = Vec::new();
    let mut parents: Vec<Option<usize>> = Vec::new();
    let mut pending: Vec<(&Node, Option<usize>)> = vec![(root, None)];

    while let Some((node, parent)) = pending.pop() {
        let index = slots.len();
        slots.push(Some(NodePayload {
            id: keep_ids.then_some(node.id),
            name: Some(node.name.clone()),
            node_type: Some(node.node_type.clone()),
            labels: Some(node.labels.clone()),
            meta: Some(node.meta.clone()),
            children: Vec::new(),
            links: Vec::new(),
        }));
        parents.push(parent);
        for child in node.children.iter().rev() {
            pending.push((child, Some(index)));
        }
    }

    // walking backwards appends siblings last-first, so each payload's
    // children are reversed once all of them have arrived
    for index in (1..slots.len()).rev() {
        let (Some(mut item), Some(parent)) = (slots[index].take(), parents[index]) else {
            continue;
        };
        item.children.reverse();
        if let Some(target) = slots[parent].as_mut() {
            target.children.push(item);
        }
    }
    let mut top = slots.first_mut().and_then(Option::take).unwrap_or_default();
    top.children.reverse();
    top
}
