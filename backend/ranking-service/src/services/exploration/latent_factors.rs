// ============================================
// Latent factors + user/item interaction matrix
// ============================================
//
// Read-only inputs to the exploration ranker, produced offline by the
// matrix-factorization trainer and loaded from its JSON artifact.
//
// Artifact layout:
//   user_ids / item_ids       row order of the factor matrices
//   user_factors / item_factors  row-major, shared rank
//   interactions              [user_id, job_id, weight] triples

use super::{ExplorationError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// User and item factor matrices plus the id <-> row-index maps.
#[derive(Debug, Clone)]
pub struct LatentFactors {
    user_factors: Array2<f32>,
    item_factors: Array2<f32>,
    user_id_to_index: HashMap<i64, usize>,
    item_id_to_index: HashMap<i64, usize>,
    index_to_item_id: HashMap<usize, i64>,
}

impl LatentFactors {
    /// Rows of `user_factors` / `item_factors` follow `user_ids` / `item_ids`.
    pub fn new(
        user_factors: Array2<f32>,
        item_factors: Array2<f32>,
        user_ids: &[i64],
        item_ids: &[i64],
    ) -> Result<Self> {
        if user_factors.nrows() != user_ids.len() {
            return Err(ExplorationError::InvalidModel(format!(
                "{} user factor rows for {} user ids",
                user_factors.nrows(),
                user_ids.len()
            )));
        }
        if item_factors.nrows() != item_ids.len() {
            return Err(ExplorationError::InvalidModel(format!(
                "{} item factor rows for {} item ids",
                item_factors.nrows(),
                item_ids.len()
            )));
        }

        let user_id_to_index = user_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();
        let index_to_item_id = item_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (idx, *id))
            .collect();

        Self::with_maps(user_factors, item_factors, user_id_to_index, index_to_item_id)
    }

    /// Builds from explicit maps. Items without an id mapping stay in the
    /// matrix but are never returned.
    pub fn with_maps(
        user_factors: Array2<f32>,
        item_factors: Array2<f32>,
        user_id_to_index: HashMap<i64, usize>,
        index_to_item_id: HashMap<usize, i64>,
    ) -> Result<Self> {
        if user_factors.ncols() != item_factors.ncols() {
            return Err(ExplorationError::InvalidModel(format!(
                "rank mismatch: users {} vs items {}",
                user_factors.ncols(),
                item_factors.ncols()
            )));
        }
        if let Some(idx) = user_id_to_index
            .values()
            .find(|idx| **idx >= user_factors.nrows())
        {
            return Err(ExplorationError::InvalidModel(format!(
                "user index {} out of range",
                idx
            )));
        }
        if let Some(idx) = index_to_item_id
            .keys()
            .find(|idx| **idx >= item_factors.nrows())
        {
            return Err(ExplorationError::InvalidModel(format!(
                "item index {} out of range",
                idx
            )));
        }

        let item_id_to_index = index_to_item_id
            .iter()
            .map(|(idx, id)| (*id, *idx))
            .collect();

        Ok(Self {
            user_factors,
            item_factors,
            user_id_to_index,
            item_id_to_index,
            index_to_item_id,
        })
    }

    pub fn rank(&self) -> usize {
        self.item_factors.ncols()
    }

    pub fn num_users(&self) -> usize {
        self.user_factors.nrows()
    }

    pub fn num_items(&self) -> usize {
        self.item_factors.nrows()
    }

    pub fn user_index(&self, user_id: i64) -> Option<usize> {
        self.user_id_to_index.get(&user_id).copied()
    }

    pub fn item_index(&self, job_id: i64) -> Option<usize> {
        self.item_id_to_index.get(&job_id).copied()
    }

    pub fn item_id(&self, item_index: usize) -> Option<i64> {
        self.index_to_item_id.get(&item_index).copied()
    }

    /// Every mapped job id, ascending.
    pub fn item_ids_sorted(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.index_to_item_id.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn user_factor(&self, user_index: usize) -> ArrayView1<'_, f32> {
        self.user_factors.row(user_index)
    }

    pub fn item_factor(&self, item_index: usize) -> ArrayView1<'_, f32> {
        self.item_factors.row(item_index)
    }

    /// Scores of every item against `user_factor`, indexed by item row.
    pub fn score_all(&self, user_factor: &ArrayView1<'_, f32>) -> Array1<f32> {
        self.item_factors.dot(user_factor)
    }

    pub fn dot(&self, user_index: usize, item_index: usize) -> f32 {
        self.user_factor(user_index).dot(&self.item_factor(item_index))
    }

    /// Collaborative score for one `(user, job)` pair; 0.0 when either is unmapped.
    pub fn score(&self, user_id: i64, job_id: i64) -> f32 {
        match (self.user_index(user_id), self.item_index(job_id)) {
            (Some(u), Some(i)) => self.dot(u, i),
            _ => 0.0,
        }
    }
}

/// Sparse user x item interaction matrix in CSR form.
#[derive(Debug, Clone, PartialEq)]
pub struct UserItemMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f32>,
}

impl UserItemMatrix {
    pub fn empty(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            indptr: vec![0; n_rows + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Duplicate `(row, col)` entries are summed; out-of-range entries are dropped.
    pub fn from_triplets<I>(n_rows: usize, n_cols: usize, triplets: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize, f32)>,
    {
        let mut rows: Vec<Vec<(usize, f32)>> = vec![Vec::new(); n_rows];
        for (row, col, value) in triplets {
            if row < n_rows && col < n_cols {
                rows[row].push((col, value));
            }
        }

        let mut matrix = Self::empty(n_rows, n_cols);
        for (row, mut entries) in rows.into_iter().enumerate() {
            entries.sort_by_key(|(col, _)| *col);
            let mut last_col: Option<usize> = None;
            for (col, value) in entries {
                if last_col == Some(col) {
                    if let Some(slot) = matrix.data.last_mut() {
                        *slot += value;
                    }
                } else {
                    matrix.indices.push(col);
                    matrix.data.push(value);
                    last_col = Some(col);
                }
            }
            matrix.indptr[row + 1] = matrix.indices.len();
        }
        matrix
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let (start, end) = if row < self.n_rows {
            (self.indptr[row], self.indptr[row + 1])
        } else {
            (0, 0)
        };
        self.indices[start..end]
            .iter()
            .copied()
            .zip(self.data[start..end].iter().copied())
    }

    /// Item indices the user interacted with (positive entries).
    pub fn seen_items(&self, row: usize) -> HashSet<usize> {
        self.row(row)
            .filter(|(_, value)| *value > 0.0)
            .map(|(col, _)| col)
            .collect()
    }

    pub fn interaction_count(&self, row: usize) -> usize {
        self.row(row).filter(|(_, value)| *value > 0.0).count()
    }
}

/// JSON artifact written by the offline trainer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfArtifact {
    pub user_ids: Vec<i64>,
    pub item_ids: Vec<i64>,
    pub user_factors: Vec<Vec<f32>>,
    pub item_factors: Vec<Vec<f32>>,
    #[serde(default)]
    pub interactions: Vec<(i64, i64, f32)>,
}

fn to_matrix(rows: &[Vec<f32>], rank: usize, what: &str) -> Result<Array2<f32>> {
    if let Some(bad) = rows.iter().position(|row| row.len() != rank) {
        return Err(ExplorationError::InvalidModel(format!(
            "{} factor row {} has length {}, expected {}",
            what,
            bad,
            rows[bad].len(),
            rank
        )));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), rank), flat)
        .map_err(|e| ExplorationError::InvalidModel(e.to_string()))
}

impl CfArtifact {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ExplorationError::InvalidModel(e.to_string()))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| ExplorationError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&bytes)
    }
}

/// Factors and interaction matrix of one training run.
#[derive(Debug, Clone)]
pub struct CfSnapshot {
    pub factors: LatentFactors,
    pub interactions: UserItemMatrix,
}

impl CfSnapshot {
    pub fn new(factors: LatentFactors, interactions: UserItemMatrix) -> Self {
        Self {
            factors,
            interactions,
        }
    }

    pub fn from_artifact(artifact: CfArtifact) -> Result<Self> {
        let rank = artifact
            .user_factors
            .first()
            .or_else(|| artifact.item_factors.first())
            .map(Vec::len)
            .unwrap_or(0);

        let user_factors = to_matrix(&artifact.user_factors, rank, "user")?;
        let item_factors = to_matrix(&artifact.item_factors, rank, "item")?;
        let factors = LatentFactors::new(
            user_factors,
            item_factors,
            &artifact.user_ids,
            &artifact.item_ids,
        )?;

        let triplets: Vec<(usize, usize, f32)> = artifact
            .interactions
            .iter()
            .filter_map(|(user_id, job_id, weight)| {
                Some((factors.user_index(*user_id)?, factors.item_index(*job_id)?, *weight))
            })
            .collect();
        let interactions =
            UserItemMatrix::from_triplets(factors.num_users(), factors.num_items(), triplets);

        Ok(Self::new(factors, interactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_score_dot_product_and_unmapped() {
        let factors = LatentFactors::new(
            array![[1.0, 2.0]],
            array![[3.0, 4.0], [0.5, 0.0]],
            &[10],
            &[100, 200],
        )
        .unwrap();

        assert!((factors.score(10, 100) - 11.0).abs() < 1e-6);
        assert_eq!(factors.score(10, 999), 0.0);
        assert_eq!(factors.score(999, 100), 0.0);
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let err = LatentFactors::new(array![[1.0, 2.0]], array![[3.0, 4.0]], &[1, 2], &[100]);
        assert!(matches!(err, Err(ExplorationError::InvalidModel(_))));
    }

    #[test]
    fn test_csr_sums_duplicates_and_counts_positive() {
        let matrix = UserItemMatrix::from_triplets(
            2,
            4,
            vec![(0, 3, 1.0), (0, 1, 1.0), (0, 3, 2.0), (1, 0, 0.0), (5, 0, 1.0)],
        );

        assert_eq!(matrix.row(0).collect::<Vec<_>>(), vec![(1, 1.0), (3, 3.0)]);
        assert_eq!(matrix.interaction_count(0), 2);
        assert_eq!(matrix.interaction_count(1), 0);
        assert_eq!(matrix.row(7).count(), 0);
    }

    #[test]
    fn test_snapshot_from_artifact() {
        let raw = r#"{
            "user_ids": [7, 8],
            "item_ids": [100, 200, 300],
            "user_factors": [[1.0, 0.0], [0.0, 1.0]],
            "item_factors": [[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]],
            "interactions": [[7, 100, 1.0], [8, 300, 1.0], [9, 100, 1.0]]
        }"#;

        let snapshot = CfSnapshot::from_artifact(CfArtifact::from_json(raw.as_bytes()).unwrap()).unwrap();
        assert_eq!(snapshot.factors.rank(), 2);
        assert_eq!(snapshot.interactions.shape(), (2, 3));
        assert_eq!(snapshot.interactions.seen_items(0), HashSet::from([0]));
        assert_eq!(snapshot.interactions.seen_items(1), HashSet::from([2]));
    }

    #[test]
    fn test_artifact_with_ragged_rows_rejected() {
        let artifact = CfArtifact {
            user_ids: vec![1],
            item_ids: vec![2],
            user_factors: vec![vec![1.0, 0.0]],
            item_factors: vec![vec![1.0]],
            interactions: Vec::new(),
        };
        assert!(CfSnapshot::from_artifact(artifact).is_err());
    }
}
