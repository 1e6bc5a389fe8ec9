use crate::{
    error::{EngineError, Result},
    ingestor::types::{PoolSnapshot, ValuePoint},
};
use rust_decimal::Decimal;
use std::iter;

/// Dense per-block share value over `[start_block, end_block)`.
///
/// Keeps a prefix-sum table alongside the values so that the sum over any
/// constant-balance segment is a single subtraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCurve {
    start_block: u64,
    values: Vec<Decimal>,
    prefix: Vec<Decimal>,
}

impl ValueCurve {
    pub fn new(start_block: u64, values: Vec<Decimal>) -> Result<Self> {
        let mut prefix = Vec::with_capacity(values.len() + 1);
        let mut running = Decimal::ZERO;
        prefix.push(running);
        for value in &values {
            running = running
                .checked_add(*value)
                .ok_or(EngineError::Overflow("value curve prefix sum"))?;
            prefix.push(running);
        }
        Ok(Self {
            start_block,
            values,
            prefix,
        })
    }

    /// Constant curve, used when a pool saw no value-changing interaction
    pub fn constant(start_block: u64, end_block: u64, value: Decimal) -> Result<Self> {
        ensure_range(start_block, end_block)?;
        let len = (end_block - start_block) as usize;
        Self::new(start_block, vec![value; len])
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    pub fn end_block(&self) -> u64 {
        self.start_block + self.values.len() as u64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Decimal] {
        &self.values
    }

    pub fn value_at(&self, block: u64) -> Option<Decimal> {
        block
            .checked_sub(self.start_block)
            .and_then(|offset| self.values.get(offset as usize))
            .copied()
    }

    /// Sum of values over `[from_block, to_block)`, clamped to the curve
    pub fn segment_sum(&self, from_block: u64, to_block: u64) -> Result<Decimal> {
        let from = from_block.clamp(self.start_block, self.end_block()) - self.start_block;
        let to = to_block.clamp(self.start_block, self.end_block()) - self.start_block;
        if to <= from {
            return Ok(Decimal::ZERO);
        }
        self.prefix[to as usize]
            .checked_sub(self.prefix[from as usize])
            .ok_or(EngineError::Overflow("value curve segment"))
    }

    /// Collapse the dense curve back into its step points
    pub fn steps(&self) -> Vec<ValuePoint> {
        let mut steps: Vec<ValuePoint> = Vec::new();
        for (offset, value) in self.values.iter().enumerate() {
            if steps.last().map(|p| p.value) != Some(*value) {
                steps.push(ValuePoint {
                    block: self.start_block + offset as u64,
                    value: *value,
                });
            }
        }
        steps
    }
}

/// Build the dense value curve for `[start_block, end_block)` from sparse
/// value points.
///
/// The value is a right-continuous step function: a point at block `b` holds
/// from `b` until the next point. Points before `start_block` only move the
/// opening value; points at or after `end_block` are ignored. Two points on the
/// same block are rejected.
pub fn build_value_curve(
    points: &[ValuePoint],
    initial_value: Decimal,
    start_block: u64,
    end_block: u64,
) -> Result<ValueCurve> {
    ensure_range(start_block, end_block)?;

    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.block);
    for pair in sorted.windows(2) {
        if pair[1].block <= pair[0].block {
            return Err(EngineError::NonMonotonicValuePoints {
                previous: pair[0].block,
                block: pair[1].block,
            });
        }
    }

    let expected = (end_block - start_block) as usize;
    let mut values = Vec::with_capacity(expected);
    let mut current = initial_value;
    let mut cursor = start_block;

    for point in &sorted {
        if point.block < start_block {
            current = point.value;
            continue;
        }
        if point.block >= end_block {
            break;
        }
        values.extend(iter::repeat_n(current, (point.block - cursor) as usize));
        cursor = point.block;
        current = point.value;
    }
    values.extend(iter::repeat_n(current, (end_block - cursor) as usize));

    if values.len() != expected {
        return Err(EngineError::LengthMismatch {
            what: "value curve",
            expected,
            actual: values.len(),
        });
    }

    ValueCurve::new(start_block, values)
}

/// Turn pool snapshots taken at interaction blocks into value points
pub fn value_points_from_snapshots(snapshots: &[PoolSnapshot]) -> Vec<ValuePoint> {
    snapshots.iter().map(PoolSnapshot::value_point).collect()
}

fn ensure_range(start_block: u64, end_block: u64) -> Result<()> {
    if end_block < start_block {
        return Err(EngineError::InvalidRange {
            start: start_block,
            end: end_block,
        });
    }
    Ok(())
}
