//! Assembling the output tile from decoded source tiles.

use std::collections::HashMap;
use std::sync::Arc;

use super::buffer::Tile;
use super::decoder::DecodedTile;
use super::layout::{TileLayout, CHANNELS};
use super::plan::{SamplePlan, Span};

/// Default byte for pixels outside the slide (white)
pub const DEFAULT_PAD_VALUE: u8 = 255;

/// Copy the region of `plan` out of `tiles` into a new tile.
///
/// `tiles` is keyed by `(tile_x, tile_y)`. Output pixels with no source,
/// either past the level grid or past the decoded extent of a short tile,
/// keep `pad`.
pub fn stitch(
    plan: &SamplePlan,
    tiles: &HashMap<(u32, u32), Arc<DecodedTile>>,
    pad: u8,
) -> Tile {
    let mut out = Tile::filled(plan.img_size, plan.layout, pad);
    let side = plan.img_size as usize;
    let columns = plan.column_spans();

    for row in plan.row_spans() {
        for column in &columns {
            let (Ok(tx), Ok(ty)) = (u32::try_from(column.tile), u32::try_from(row.tile)) else {
                continue;
            };
            if let Some(source) = tiles.get(&(tx, ty)) {
                // Edge tiles are stored whole; only the part inside the level counts
                let extent = (
                    level_extent(plan.level_width, plan.tile_width, tx).min(source.width),
                    level_extent(plan.level_height, plan.tile_height, ty).min(source.height),
                );
                copy_block(out.data_mut(), side, plan.layout, source, extent, &row, column);
            }
        }
    }
    out
}

/// Pixels of tile `index` along an axis that lie inside the level.
fn level_extent(level_dim: u32, tile_dim: u32, index: u32) -> u32 {
    let start = u64::from(tile_dim) * u64::from(index);
    u64::from(level_dim).saturating_sub(start).min(u64::from(tile_dim)) as u32
}

/// Copy the `row` x `column` block of `source` into `dst`, clipped to
/// `extent`, the `(width, height)` of usable source pixels.
fn copy_block(
    dst: &mut [u8],
    side: usize,
    layout: TileLayout,
    source: &DecodedTile,
    extent: (u32, u32),
    row: &Span,
    column: &Span,
) {
    let rows = row.len.min(extent.1.saturating_sub(row.src_start)) as usize;
    let cols = column.len.min(extent.0.saturating_sub(column.src_start)) as usize;
    if rows == 0 || cols == 0 {
        return;
    }

    let src_w = source.width as usize;
    let src_plane = src_w * source.height as usize;
    let (src_row0, src_col0) = (row.src_start as usize, column.src_start as usize);
    let (dst_row0, dst_col0) = (row.dst_start as usize, column.dst_start as usize);

    match (source.layout, layout) {
        (TileLayout::HeightFirst, TileLayout::HeightFirst) => {
            for r in 0..rows {
                let src = ((src_row0 + r) * src_w + src_col0) * CHANNELS;
                let dst_at = ((dst_row0 + r) * side + dst_col0) * CHANNELS;
                dst[dst_at..dst_at + cols * CHANNELS]
                    .copy_from_slice(&source.data[src..src + cols * CHANNELS]);
            }
        }
        (TileLayout::ChannelFirst, TileLayout::ChannelFirst) => {
            for c in 0..CHANNELS {
                for r in 0..rows {
                    let src = c * src_plane + (src_row0 + r) * src_w + src_col0;
                    let dst_at = c * side * side + (dst_row0 + r) * side + dst_col0;
                    dst[dst_at..dst_at + cols].copy_from_slice(&source.data[src..src + cols]);
                }
            }
        }
        _ => {
            for r in 0..rows {
                for col in 0..cols {
                    let (src_row, src_col) = ((src_row0 + r) as u32, (src_col0 + col) as u32);
                    for c in 0..CHANNELS {
                        if let Some(value) = source.sample(c, src_row, src_col) {
                            dst[layout.index(side, c, dst_row0 + r, dst_col0 + col)] = value;
                        }
                    }
                }
            }
        }
    }
}
