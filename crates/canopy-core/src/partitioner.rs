//! Geometry partitioner.
//!
//! Splits an AOI into a bounded number of sub-regions sized for efficient
//! querying. The adaptive scheme derives a target partition count from the
//! AOI's area and a per-partition budget instead of fragmenting at a fixed
//! interval, which over-fragments large AOIs. The legacy fixed-interval
//! scheme is kept as a selectable variant for behavioral parity with older
//! callers.

use crate::domain::{AoiGeometry, BoundingBox, Partition};
use crate::ValidationError;

/// Upper bound on grid cells considered before giving up on subdivision.
/// Pathologically sparse AOIs (tiny islands across a huge bounding box)
/// would otherwise grind through millions of empty cells.
const MAX_GRID_CELLS: usize = 16_384;

/// Interchangeable partitioning strategies behind one `partition()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionScheme {
    /// Target count from `ceil(area / area_budget_deg2)`, capped at the
    /// partition maximum; grid cell size derived from `area / target`.
    Adaptive {
        area_budget_deg2: f64,
        /// Bounded overlap added around each cell to avoid losing alerts on
        /// partition edges.
        buffer_deg: f64,
    },
    /// Constant-interval grid regardless of AOI size.
    FixedInterval {
        interval_deg: f64,
        buffer_deg: f64,
    },
}

impl Default for PartitionScheme {
    fn default() -> Self {
        Self::Adaptive {
            area_budget_deg2: 1.0,
            buffer_deg: 0.01,
        }
    }
}

/// Splits the AOI into at most `max_partitions` sub-regions whose union
/// covers it. Falls back to a single whole-AOI partition whenever a scheme
/// would exceed the cap without reducing area.
pub fn partition(
    aoi: &AoiGeometry,
    scheme: &PartitionScheme,
    max_partitions: usize,
) -> Result<Vec<Partition>, ValidationError> {
    if max_partitions == 0 {
        return Err(ValidationError::ZeroConfigValue {
            field: "max_partitions",
        });
    }

    let area = aoi.area();
    if !(area > 0.0) || !area.is_finite() {
        return Err(ValidationError::DegenerateGeometry);
    }

    let (cell_size, buffer) = match *scheme {
        PartitionScheme::Adaptive {
            area_budget_deg2,
            buffer_deg,
        } => {
            if !(area_budget_deg2 > 0.0) {
                return Err(ValidationError::ZeroConfigValue {
                    field: "area_budget_deg2",
                });
            }
            let target = ((area / area_budget_deg2).ceil() as usize).clamp(1, max_partitions);
            if target == 1 {
                return Ok(vec![whole(aoi)]);
            }
            ((area / target as f64).sqrt(), buffer_deg)
        }
        PartitionScheme::FixedInterval {
            interval_deg,
            buffer_deg,
        } => {
            if !(interval_deg > 0.0) {
                return Err(ValidationError::ZeroConfigValue {
                    field: "interval_deg",
                });
            }
            (interval_deg, buffer_deg)
        }
    };

    let cells = match grid_cells(aoi, cell_size) {
        Some(cells) => cells,
        None => return Ok(vec![whole(aoi)]),
    };

    let kept: Vec<Partition> = cells
        .into_iter()
        .filter(|cell| aoi.intersects_rect(cell))
        .map(|cell| Partition {
            geometry: AoiGeometry::rect(cell.expanded(buffer.max(0.0))),
        })
        .collect();

    if kept.is_empty() || kept.len() > max_partitions {
        return Ok(vec![whole(aoi)]);
    }

    Ok(kept)
}

fn whole(aoi: &AoiGeometry) -> Partition {
    Partition {
        geometry: aoi.clone(),
    }
}

/// Grid over the AOI bounding box; `None` when the grid would be too fine
/// to enumerate.
fn grid_cells(aoi: &AoiGeometry, cell_size: f64) -> Option<Vec<BoundingBox>> {
    let bbox = aoi.bounding_box();
    if !(cell_size > 0.0) || !cell_size.is_finite() {
        return None;
    }

    let cols = (bbox.width() / cell_size).ceil().max(1.0);
    let rows = (bbox.height() / cell_size).ceil().max(1.0);
    if cols * rows > MAX_GRID_CELLS as f64 {
        return None;
    }

    let mut cells = Vec::with_capacity((cols * rows) as usize);
    let mut x = bbox.min_x;
    while x < bbox.max_x {
        let mut y = bbox.min_y;
        while y < bbox.max_y {
            cells.push(BoundingBox {
                min_x: x,
                min_y: y,
                max_x: (x + cell_size).min(bbox.max_x),
                max_y: (y + cell_size).min(bbox.max_y),
            });
            y += cell_size;
        }
        x += cell_size;
    }
    Some(cells)
}
