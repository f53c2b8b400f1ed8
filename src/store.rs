//! sled-backed persistence for documents and their history
use crate::access::Resource;
use crate::document::Versioned;
use crate::error::{WorkflowError, abort};
use crate::history::HistoryRecord;
use crate::utils;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use std::sync::Arc;

pub const SEQUENCE_TREE: &str = "history_sequence";

/// Document tree plus history tree of one family.
#[derive(Clone)]
pub(crate) struct FamilyTrees {
    pub documents: sled::Tree,
    pub history: sled::Tree,
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
    estimates: FamilyTrees,
    contracts: FamilyTrees,
    sequences: sled::Tree,
}

impl FamilyTrees {
    fn open<T: Versioned>(db: &sled::Db) -> sled::Result<Self> {
        Ok(Self {
            documents: db.open_tree(T::TREE)?,
            history: db.open_tree(T::HISTORY_TREE)?,
        })
    }
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, WorkflowError> {
        Ok(Self {
            estimates: FamilyTrees::open::<crate::estimate::Estimate>(&instance)?,
            contracts: FamilyTrees::open::<crate::contract::Contract>(&instance)?,
            sequences: instance.open_tree(SEQUENCE_TREE)?,
            instance,
        })
    }

    pub fn instance(&self) -> &Arc<sled::Db> {
        &self.instance
    }

    pub(crate) fn family<T: Versioned>(&self) -> &FamilyTrees {
        match T::RESOURCE {
            Resource::Estimate => &self.estimates,
            Resource::Contract => &self.contracts,
        }
    }

    pub(crate) fn sequences(&self) -> &sled::Tree {
        &self.sequences
    }

    pub fn flush(&self) -> Result<(), WorkflowError> {
        self.instance.flush()?;
        Ok(())
    }

    pub fn load<T: Versioned>(&self, id: &str) -> Result<Option<T>, WorkflowError> {
        match self.family::<T>().documents.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list<T: Versioned>(&self) -> Result<Vec<T>, WorkflowError> {
        self.family::<T>()
            .documents
            .iter()
            .values()
            .map(|bytes| -> Result<T, WorkflowError> { Ok(minicbor::decode(&bytes?)?) })
            .collect()
    }

    /// History of one document, newest version first.
    pub fn history<T: Versioned>(&self, entity_id: &str) -> Result<Vec<HistoryRecord>, WorkflowError> {
        self.family::<T>()
            .history
            .scan_prefix(utils::history_prefix(entity_id))
            .values()
            .rev()
            .map(|bytes| -> Result<HistoryRecord, WorkflowError> {
                Ok(minicbor::decode(&bytes?)?)
            })
            .collect()
    }
}

// Helpers for use inside sled transactions. Any error aborts the transaction.

pub(crate) fn encode_tx<T: minicbor::Encode<()>>(
    value: &T,
) -> ConflictableTransactionResult<Vec<u8>, WorkflowError> {
    match minicbor::to_vec(value) {
        Ok(bytes) => Ok(bytes),
        Err(err) => abort(err),
    }
}

pub(crate) fn load_tx<T>(
    tree: &TransactionalTree,
    key: &[u8],
) -> ConflictableTransactionResult<Option<T>, WorkflowError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key)? {
        Some(bytes) => match minicbor::decode(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => abort(err),
        },
        None => Ok(None),
    }
}

pub(crate) fn save_tx<T: Versioned>(
    tree: &TransactionalTree,
    document: &T,
) -> ConflictableTransactionResult<(), WorkflowError> {
    tree.insert(document.id().as_bytes(), encode_tx(document)?)?;
    Ok(())
}
