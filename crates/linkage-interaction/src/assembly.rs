//! Hand-off of pair contributions to the global system.
//!
//! Forces are per entity node; stiffness blocks follow `K = -dF/dx` so a
//! positive-definite block stabilizes the system. Assembly is additive.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Neg};

use glam::{DMat3, DVec3};
use linkage_binning::EntityId;

/// Which contributions an evaluation computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    Force,
    Stiffness,
    ForceStiffness,
}

impl EvaluationMode {
    pub fn wants_force(self) -> bool {
        matches!(self, Self::Force | Self::ForceStiffness)
    }

    pub fn wants_stiffness(self) -> bool {
        matches!(self, Self::Stiffness | Self::ForceStiffness)
    }
}

/// Node-by-node matrix of 3x3 blocks, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NodalMatrix {
    rows: usize,
    cols: usize,
    blocks: Vec<DMat3>,
}

impl NodalMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            blocks: vec![DMat3::ZERO; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn block(&self, row: usize, col: usize) -> DMat3 {
        self.blocks[row * self.cols + col]
    }

    pub fn add_block(&mut self, row: usize, col: usize, block: DMat3) {
        self.blocks[row * self.cols + col] += block;
    }

    /// Build from weights: block (r, c) is `w_row[r] * w_col[c] * m`.
    pub fn outer(w_row: &[f64], w_col: &[f64], m: DMat3) -> Self {
        let mut out = Self::zeros(w_row.len(), w_col.len());
        for (r, wr) in w_row.iter().enumerate() {
            for (c, wc) in w_col.iter().enumerate() {
                out.add_block(r, c, m * (wr * wc));
            }
        }
        out
    }

    pub fn is_zero(&self) -> bool {
        self.blocks.iter().all(|b| *b == DMat3::ZERO)
    }

    pub fn max_abs(&self) -> f64 {
        self.blocks
            .iter()
            .flat_map(|b| b.to_cols_array())
            .fold(0.0, |acc, v| acc.max(v.abs()))
    }
}

impl Neg for NodalMatrix {
    type Output = NodalMatrix;

    fn neg(mut self) -> NodalMatrix {
        for b in &mut self.blocks {
            *b = -*b;
        }
        self
    }
}

impl Add for NodalMatrix {
    type Output = NodalMatrix;

    fn add(mut self, rhs: NodalMatrix) -> NodalMatrix {
        self += rhs;
        self
    }
}

impl AddAssign for NodalMatrix {
    fn add_assign(&mut self, rhs: NodalMatrix) {
        for (a, b) in self.blocks.iter_mut().zip(rhs.blocks) {
            *a += b;
        }
    }
}

/// Local contribution of one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairEvaluation {
    /// Nodal forces on entity a and entity b.
    pub forces: [Vec<DVec3>; 2],
    /// `[[K_aa, K_ab], [K_ba, K_bb]]`.
    pub stiffness: Option<[[NodalMatrix; 2]; 2]>,
    pub active: bool,
}

impl PairEvaluation {
    /// Zero contribution for an inactive pair.
    pub fn inactive(nodes_a: usize, nodes_b: usize, mode: EvaluationMode) -> Self {
        let stiffness = mode.wants_stiffness().then(|| {
            [
                [NodalMatrix::zeros(nodes_a, nodes_a), NodalMatrix::zeros(nodes_a, nodes_b)],
                [NodalMatrix::zeros(nodes_b, nodes_a), NodalMatrix::zeros(nodes_b, nodes_b)],
            ]
        });
        Self {
            forces: [vec![DVec3::ZERO; nodes_a], vec![DVec3::ZERO; nodes_b]],
            stiffness,
            active: false,
        }
    }

    /// Sum of all nodal forces.
    pub fn net_force(&self) -> DVec3 {
        self.forces.iter().flatten().copied().sum()
    }
}

/// Receiver of local contributions.
pub trait Assembler {
    /// Add nodal forces of the two entities.
    fn assemble_force(&mut self, ids: [EntityId; 2], forces: &[Vec<DVec3>; 2]);

    /// Add the four coupling blocks of the two entities.
    fn assemble_stiffness(&mut self, ids: [EntityId; 2], blocks: &[[NodalMatrix; 2]; 2]);

    /// Add a moment on a rotational entity.
    fn assemble_moment(&mut self, _entity: EntityId, _moment: DVec3) {}
}

/// Assembler that sums contributions in maps, for drivers and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectingAssembler {
    pub forces: BTreeMap<(EntityId, usize), DVec3>,
    pub stiffness: BTreeMap<(EntityId, usize, EntityId, usize), DMat3>,
    pub moments: BTreeMap<EntityId, DVec3>,
}

impl CollectingAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(&self, entity: EntityId, node: usize) -> DVec3 {
        self.forces.get(&(entity, node)).copied().unwrap_or(DVec3::ZERO)
    }

    /// Total force on an entity over all its nodes.
    pub fn entity_force(&self, entity: EntityId) -> DVec3 {
        self.forces
            .range((entity, 0)..=(entity, usize::MAX))
            .map(|(_, f)| *f)
            .sum()
    }

    pub fn moment(&self, entity: EntityId) -> DVec3 {
        self.moments.get(&entity).copied().unwrap_or(DVec3::ZERO)
    }

    pub fn net_force(&self) -> DVec3 {
        self.forces.values().copied().sum()
    }

    pub fn clear(&mut self) {
        self.forces.clear();
        self.stiffness.clear();
        self.moments.clear();
    }
}

impl Assembler for CollectingAssembler {
    fn assemble_force(&mut self, ids: [EntityId; 2], forces: &[Vec<DVec3>; 2]) {
        for (id, nodal) in ids.iter().zip(forces) {
            for (node, f) in nodal.iter().enumerate() {
                *self.forces.entry((*id, node)).or_insert(DVec3::ZERO) += *f;
            }
        }
    }

    fn assemble_stiffness(&mut self, ids: [EntityId; 2], blocks: &[[NodalMatrix; 2]; 2]) {
        for (r, row_id) in ids.iter().enumerate() {
            for (c, col_id) in ids.iter().enumerate() {
                let m = &blocks[r][c];
                for i in 0..m.rows() {
                    for j in 0..m.cols() {
                        *self
                            .stiffness
                            .entry((*row_id, i, *col_id, j))
                            .or_insert(DMat3::ZERO) += m.block(i, j);
                    }
                }
            }
        }
    }

    fn assemble_moment(&mut self, entity: EntityId, moment: DVec3) {
        *self.moments.entry(entity).or_insert(DVec3::ZERO) += moment;
    }
}
