//! Discrete factor tables: joint weight tables over the domains of the
//! variables a factor connects.
//!
//! A table is either dense (one contiguous value per joint index) or sparse
//! (sorted joint-index/value entries for the non-zero cells only). Joint
//! indexing is column-major: dimension 0 varies fastest, so the stride of
//! dimension `d` is the product of the sizes of dimensions `0..d`.
//!
//! Tables are owned by the graph/solver and read-only from the planner's
//! perspective; each table carries a process-unique [`TableId`] that keys
//! plans and per-table settings.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::engine::errors::FactorPlanError;

/// Inline capacity for dimension-size vectors; factor tables rarely connect
/// more than a handful of edges.
pub(crate) type Dims = SmallVec<[usize; 8]>;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identifier for a factor table.
///
/// Identity, not shape, keys the plan cache and the per-table settings store:
/// factors that share a table share a plan.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableId(pub u64);

/// Backing storage for a factor table.
#[derive(Debug, Clone)]
pub enum TableStorage {
    /// One value per joint index, in joint-index order.
    Dense(Vec<f64>),
    /// Non-zero cells only, as parallel arrays sorted by joint index.
    Sparse {
        joint_indices: Vec<u32>,
        values: Vec<f64>,
    },
}

/// A joint weight table over the discrete domains of a factor's edges.
#[derive(Debug, Clone)]
pub struct FactorTable {
    id: TableId,
    dims: Dims,
    storage: TableStorage,
}

impl FactorTable {
    /// Creates a dense table. `values` must hold exactly one entry per joint
    /// index, i.e. the product of the dimension sizes.
    pub fn new_dense(dims: &[usize], values: Vec<f64>) -> Result<Self, FactorPlanError> {
        let dims = validate_dims(dims)?;
        let cardinality = checked_cardinality(&dims)?;
        if values.len() != cardinality {
            return Err(FactorPlanError::InvalidTable(format!(
                "dense table needs {} values for dimensions {:?}, got {}",
                cardinality,
                &dims[..],
                values.len()
            )));
        }
        Ok(Self {
            id: fresh_id(),
            dims,
            storage: TableStorage::Dense(values),
        })
    }

    /// Creates a sparse table from coordinate/value entries. Entries need not
    /// be sorted; duplicate coordinates are rejected.
    pub fn new_sparse(
        dims: &[usize],
        entries: &[(Vec<usize>, f64)],
    ) -> Result<Self, FactorPlanError> {
        let dims = validate_dims(dims)?;
        let cardinality = checked_cardinality(&dims)?;
        if cardinality > u32::MAX as usize {
            return Err(FactorPlanError::InvalidTable(format!(
                "sparse table cardinality {} exceeds the u32 joint-index range",
                cardinality
            )));
        }
        let mut cells: Vec<(u32, f64)> = Vec::with_capacity(entries.len());
        for (coords, value) in entries {
            let joint = joint_from_coords(&dims, coords)?;
            cells.push((joint as u32, *value));
        }
        cells.sort_by_key(|&(joint, _)| joint);
        for pair in cells.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(FactorPlanError::InvalidTable(format!(
                    "duplicate sparse entry at joint index {}",
                    pair[0].0
                )));
            }
        }
        let (joint_indices, values) = cells.into_iter().unzip();
        Ok(Self {
            id: fresh_id(),
            dims,
            storage: TableStorage::Sparse {
                joint_indices,
                values,
            },
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    /// The domain size of each connected edge, in edge order.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn num_dims(&self) -> usize {
        self.dims.len()
    }

    /// Product of the dimension sizes: the number of joint configurations.
    pub fn cardinality(&self) -> usize {
        self.dims.iter().product()
    }

    /// The stride of dimension `d` in joint-index order.
    pub fn stride(&self, d: usize) -> usize {
        self.dims[..d].iter().product()
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self.storage, TableStorage::Sparse { .. })
    }

    pub fn storage(&self) -> &TableStorage {
        &self.storage
    }

    /// Number of entries whose value is non-zero. For sparse tables this is
    /// the entry count; dense tables count cells that hold exactly zero out.
    pub fn nonzero_count(&self) -> usize {
        match &self.storage {
            TableStorage::Dense(values) => values.iter().filter(|v| **v != 0.0).count(),
            TableStorage::Sparse { values, .. } => values.len(),
        }
    }

    /// Fraction of joint configurations holding a non-zero value, in [0, 1].
    /// A table with zero cardinality has density zero.
    pub fn density(&self) -> f64 {
        let cardinality = self.cardinality();
        if cardinality == 0 {
            0.0
        } else {
            self.nonzero_count() as f64 / cardinality as f64
        }
    }

    /// The stored value array: per joint index when dense, per entry when
    /// sparse.
    pub fn values(&self) -> &[f64] {
        match &self.storage {
            TableStorage::Dense(values) => values,
            TableStorage::Sparse { values, .. } => values,
        }
    }

    /// Sorted joint indices of the stored entries; `None` for dense tables.
    pub fn sparse_joint_indices(&self) -> Option<&[u32]> {
        match &self.storage {
            TableStorage::Dense(_) => None,
            TableStorage::Sparse { joint_indices, .. } => Some(joint_indices),
        }
    }
}

fn fresh_id() -> TableId {
    TableId(NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
}

fn validate_dims(dims: &[usize]) -> Result<Dims, FactorPlanError> {
    if dims.is_empty() {
        return Err(FactorPlanError::InvalidTable(
            "a factor table needs at least one dimension".into(),
        ));
    }
    Ok(Dims::from_slice(dims))
}

fn checked_cardinality(dims: &[usize]) -> Result<usize, FactorPlanError> {
    dims.iter().try_fold(1usize, |acc, &d| {
        acc.checked_mul(d).ok_or_else(|| {
            FactorPlanError::InvalidTable(format!("cardinality of {:?} overflows usize", dims))
        })
    })
}

/// Encodes coordinates into a joint index for the given dimension sizes.
pub(crate) fn joint_from_coords(
    dims: &[usize],
    coords: &[usize],
) -> Result<usize, FactorPlanError> {
    if coords.len() != dims.len() {
        return Err(FactorPlanError::InvalidTable(format!(
            "coordinate tuple {:?} does not match dimensions {:?}",
            coords, dims
        )));
    }
    let mut joint = 0usize;
    let mut stride = 1usize;
    for (&c, &d) in coords.iter().zip(dims.iter()) {
        if c >= d {
            return Err(FactorPlanError::InvalidTable(format!(
                "coordinate {} out of range for dimension of size {}",
                c, d
            )));
        }
        joint += c * stride;
        stride *= d;
    }
    Ok(joint)
}

/// Decodes a joint index into coordinates for the given dimension sizes.
pub(crate) fn coords_from_joint(dims: &[usize], joint: usize) -> Dims {
    let mut coords = Dims::with_capacity(dims.len());
    let mut rest = joint;
    for &d in dims {
        coords.push(rest % d);
        rest /= d;
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_table_validates_value_count() {
        let err = FactorTable::new_dense(&[2, 3], vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, FactorPlanError::InvalidTable(_)));
        let table = FactorTable::new_dense(&[2, 3], vec![1.0; 6]).unwrap();
        assert_eq!(table.cardinality(), 6);
        assert_eq!(table.stride(1), 2);
        assert!(!table.is_sparse());
    }

    #[test]
    fn empty_dimension_list_is_rejected() {
        assert!(FactorTable::new_dense(&[], vec![]).is_err());
    }

    #[test]
    fn joint_indexing_round_trips() {
        let dims = [3usize, 4, 2];
        for joint in 0..24 {
            let coords = coords_from_joint(&dims, joint);
            assert_eq!(joint_from_coords(&dims, &coords).unwrap(), joint);
        }
    }

    #[test]
    fn sparse_entries_are_sorted_and_deduplicated() {
        let entries = vec![(vec![1, 1], 2.0), (vec![0, 0], 1.0)];
        let table = FactorTable::new_sparse(&[2, 2], &entries).unwrap();
        assert_eq!(table.sparse_joint_indices().unwrap(), &[0, 3]);
        assert_eq!(table.values(), &[1.0, 2.0]);
        assert_eq!(table.nonzero_count(), 2);
        assert_eq!(table.density(), 0.5);

        let dup = vec![(vec![0, 0], 1.0), (vec![0, 0], 2.0)];
        assert!(FactorTable::new_sparse(&[2, 2], &dup).is_err());
    }

    #[test]
    fn zero_size_dimension_has_zero_density() {
        let table = FactorTable::new_dense(&[0, 4], vec![]).unwrap();
        assert_eq!(table.cardinality(), 0);
        assert_eq!(table.density(), 0.0);
    }

    #[test]
    fn table_ids_are_unique() {
        let a = FactorTable::new_dense(&[2], vec![1.0, 1.0]).unwrap();
        let b = a.clone();
        let c = FactorTable::new_dense(&[2], vec![1.0, 1.0]).unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }
}
