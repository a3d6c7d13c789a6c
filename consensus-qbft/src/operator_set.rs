//! Cluster operator set management.
//!
//! A QDV cluster is run by n operators, n >= 3f+1 for f tolerated Byzantine
//! faults.  Operators are indexed 0..n-1 in cluster-definition order; the
//! index is deterministic across all nodes and doubles as the `peer_idx`
//! carried in every consensus message.

use k256::ecdsa::VerifyingKey;
use std::collections::HashMap;

/// A single cluster operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    /// Deterministic position in the operator set (0..n-1).
    pub index: i64,
    /// The operator's secp256k1 identity key.
    pub pubkey: VerifyingKey,
}

/// An ordered set of cluster operators.
///
/// Order is the cluster-definition order, which every node observes
/// identically, so indices agree across the cluster without coordination.
#[derive(Debug, Clone)]
pub struct OperatorSet {
    operators: Vec<Operator>,
    /// Fast lookup from SEC1-encoded pubkey to index.
    index: HashMap<Box<[u8]>, i64>,
}

impl OperatorSet {
    /// Create an operator set from identity keys in cluster-definition order.
    pub fn new(pubkeys: Vec<VerifyingKey>) -> Self {
        let operators: Vec<Operator> = pubkeys
            .into_iter()
            .enumerate()
            .map(|(i, pubkey)| Operator {
                index: i as i64,
                pubkey,
            })
            .collect();

        let index = operators
            .iter()
            .map(|op| (op.pubkey.to_sec1_bytes(), op.index))
            .collect();

        Self { operators, index }
    }

    /// Returns the number of operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Returns the operator at the given index.
    pub fn get(&self, index: i64) -> Option<&Operator> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.operators.get(i))
    }

    /// Returns the index of the given identity key, if it is an operator.
    pub fn position(&self, pubkey: &VerifyingKey) -> Option<i64> {
        self.index.get(pubkey.to_sec1_bytes().as_ref()).copied()
    }

    /// Check whether an identity key belongs to the set.
    pub fn contains(&self, pubkey: &VerifyingKey) -> bool {
        self.position(pubkey).is_some()
    }

    /// Whether `index` is a valid operator index.
    pub fn contains_index(&self, index: i64) -> bool {
        index >= 0 && (index as usize) < self.operators.len()
    }

    /// The number of Byzantine faults the set tolerates: f = (n-1)/3.
    pub fn faulty(&self) -> usize {
        self.operators.len().saturating_sub(1) / 3
    }

    /// The quorum size: n - f, i.e. 2f+1 when n = 3f+1.
    pub fn quorum(&self) -> usize {
        self.operators.len() - self.faulty()
    }

    /// Iterator over operators in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Operator> {
        self.operators.iter()
    }
}
