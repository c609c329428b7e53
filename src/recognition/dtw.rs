//! Column-wise dynamic time warping against one reference template.
//!
//!  * Only three matrix columns are kept per template, addressed by
//!    `pos % 3`; column `pos` reads columns `pos - 1` and `pos - 2`.
//!  * Every warping step weighs two frame distances so all paths to a cell
//!    have the same length parity; costs are normalized by `pos + j + 2`.
//!  * Columns are restricted to the adjustment window intersected with the
//!    slope band; alignments may start up to `sloppy_corner` cells away from
//!    the origin and end up to `sloppy_corner` cells before the last row.
//!
//! The functions here are shared by the time-synchronous decoder and the
//! branch-and-bound search so both produce identical costs.

use crate::config::RecognizerConfig;
use crate::defaults;
use crate::features::FeatureVector;
use std::ops::Range;

/// Cost of an unreachable cell. Finite so sums with distances cannot overflow.
pub const UNREACHABLE: f32 = f32::MAX * 1.0e-4;

/// Alignment constraints and pruning threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DtwParams {
    pub adjust_window_width: usize,
    pub sloppy_corner: usize,
    pub score_threshold: f32,
}

impl Default for DtwParams {
    fn default() -> Self {
        Self {
            adjust_window_width: defaults::ADJUST_WINDOW_WIDTH,
            sloppy_corner: defaults::SLOPPY_CORNER,
            score_threshold: defaults::SCORE_THRESHOLD,
        }
    }
}

impl From<&RecognizerConfig> for DtwParams {
    fn from(config: &RecognizerConfig) -> Self {
        Self {
            adjust_window_width: config.adjust_window_width,
            sloppy_corner: config.sloppy_corner,
            score_threshold: config.score_threshold,
        }
    }
}

/// Ring of the three most recent DTW columns of one template.
#[derive(Debug, Clone)]
pub struct DtwWindow {
    rows: [Vec<f32>; 3],
}

impl DtwWindow {
    pub fn new(template_len: usize) -> Self {
        Self {
            rows: std::array::from_fn(|_| vec![UNREACHABLE; template_len]),
        }
    }

    #[inline(always)]
    pub fn slot(pos: usize) -> usize {
        pos % 3
    }

    /// Accumulated costs of column `pos`.
    #[inline(always)]
    pub fn column(&self, pos: usize) -> &[f32] {
        &self.rows[Self::slot(pos)]
    }

    /// Column `pos` cleared to [`UNREACHABLE`], plus read access to columns
    /// `pos - 1` and `pos - 2` (meaningless for `pos < 2`).
    #[inline(always)]
    fn columns_mut(&mut self, pos: usize) -> (&mut [f32], &[f32], &[f32]) {
        let [a, b, c] = &mut self.rows;
        let (cur, prev, prev2) = match Self::slot(pos) {
            0 => (a, &*c, &*b),
            1 => (b, &*a, &*c),
            _ => (c, &*b, &*a),
        };
        cur.fill(UNREACHABLE);
        (cur, prev, prev2)
    }
}

/// Euclidean distance between two feature vectors.
#[inline(always)]
pub fn distance(a: &FeatureVector, b: &FeatureVector) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[inline(always)]
fn normalized(cost: f32, pos: usize, row: usize) -> f32 {
    cost / ((pos + 1) + (row + 1)) as f32
}

#[inline(always)]
fn store(column: &mut [f32], best: &mut f32, pos: usize, row: usize, cost: f32) {
    column[row] = cost;
    *best = best.min(normalized(cost, pos, row));
}

#[inline(always)]
fn min3(a: f32, b: f32, c: f32) -> f32 {
    a.min(b).min(c)
}

/* ─────────────────────────── band geometry ─────────────────────────── */

/// Rows of column `pos >= 2` evaluated by the full recursion: the adjustment
/// window `pos ± w` intersected with the slope band
/// `(pos - 2) / 2 .. sloppy + 1 + 2 (pos - 1)`.
pub fn band(pos: usize, template_len: usize, params: &DtwParams) -> Range<usize> {
    let pos = pos as i64;
    let w = params.adjust_window_width as i64;
    let sloppy = params.sloppy_corner as i64;

    let bottom = 2.max(pos - w).max((pos - 2) / 2);
    let top = (sloppy + 1 + (pos - 1) * 2)
        .min(template_len as i64)
        .min(pos + w);

    let bottom = bottom.max(0) as usize;
    bottom..(top.max(0) as usize).max(bottom)
}

/// Whether a template of `template_len` frames can be aligned with an
/// utterance of `total` frames at all under the slope and window limits.
pub fn admissible(template_len: usize, total: usize, params: &DtwParams) -> bool {
    let len = template_len as i64;
    let total = total as i64;
    let w = params.adjust_window_width as i64;
    let sloppy = params.sloppy_corner as i64;

    !((total - 1) * 2 + (sloppy - 1) < len - 1
        || (total - sloppy) / 2 > len - 1
        || len + w < total
        || len - w > total)
}

/* ─────────────────────────── recursion ─────────────────────────── */

/// Fill column `pos` of `window` for `template`, given the test frame at
/// `pos` and the one at `pos - 1`. Returns the column's minimum normalized
/// cost ([`UNREACHABLE`]-scaled when nothing is reachable).
pub fn advance_column(
    window: &mut DtwWindow,
    template: &[FeatureVector],
    pos: usize,
    frame: &FeatureVector,
    last_frame: &FeatureVector,
    params: &DtwParams,
) -> f32 {
    let len = template.len();
    let sloppy = params.sloppy_corner;
    let (cur, prev, prev2) = window.columns_mut(pos);
    if len == 0 {
        return UNREACHABLE;
    }

    let mut best = UNREACHABLE;

    match pos {
        0 => {
            let mut acc = 2.0 * distance(&template[0], frame);
            store(cur, &mut best, pos, 0, acc);
            for (row, reference) in template.iter().enumerate().take(sloppy).skip(1) {
                acc += distance(reference, frame);
                store(cur, &mut best, pos, row, acc);
            }
        }
        1 => {
            let start = prev[0] + distance(&template[0], frame);
            store(cur, &mut best, pos, 0, start);

            if len > 1 {
                let act = distance(&template[1], frame);
                let cost = min3(prev[1] + act, cur[0] + act, prev[0] + 2.0 * act);
                store(cur, &mut best, pos, 1, cost);
            }

            for row in 2..(sloppy + 1).min(len) {
                let act = distance(&template[row], frame);
                let cost = min3(
                    prev[row] + act,
                    prev[row - 1] + 2.0 * act,
                    prev[row - 2] + 2.0 * distance(&template[row - 1], frame) + act,
                );
                store(cur, &mut best, pos, row, cost);
            }
        }
        _ => {
            if pos < sloppy {
                let cost = prev[0] + distance(&template[0], frame);
                store(cur, &mut best, pos, 0, cost);
            }

            if pos < sloppy + 1 && len > 1 {
                let act = distance(&template[1], frame);
                let cost = min3(
                    cur[0] + act,
                    prev[0] + 2.0 * act,
                    prev2[0] + 2.0 * distance(&template[1], last_frame) + act,
                );
                store(cur, &mut best, pos, 1, cost);
            }

            for row in band(pos, len, params) {
                if prev[row - 1] >= UNREACHABLE
                    && prev[row - 2] >= UNREACHABLE
                    && prev2[row - 1] >= UNREACHABLE
                {
                    continue;
                }
                let act = distance(&template[row], frame);
                let cost = min3(
                    prev[row - 1] + 2.0 * act,
                    prev[row - 2] + 2.0 * distance(&template[row - 1], frame) + act,
                    prev2[row - 1] + 2.0 * distance(&template[row], last_frame) + act,
                );
                store(cur, &mut best, pos, row, cost);
            }
        }
    }

    best
}

/// Best normalized cost of column `pos` over all rows.
pub fn column_minimum(window: &DtwWindow, pos: usize) -> f32 {
    window
        .column(pos)
        .iter()
        .enumerate()
        .map(|(row, &cost)| normalized(cost, pos, row))
        .fold(UNREACHABLE, f32::min)
}

/// Best normalized cost of an alignment ending in column `pos` within
/// `sloppy_corner` rows of the template's end.
pub fn corner_score(window: &DtwWindow, template_len: usize, pos: usize, params: &DtwParams) -> f32 {
    let column = window.column(pos);
    (0..params.sloppy_corner.min(template_len))
        .map(|s| {
            let row = template_len - 1 - s;
            column[row] / (pos + template_len - s) as f32
        })
        .fold(UNREACHABLE, f32::min)
}
