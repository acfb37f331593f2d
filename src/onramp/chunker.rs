//! Onramp Chunking
//!
//! The payment provider accepts purchases between a minimum and a maximum
//! amount. A larger shortfall is funded as a sequence of chunks, each inside
//! those bounds, that sum exactly to the shortfall.

use thiserror::Error;

/// Upper bound on payments in one funding run
pub const MAX_CHUNKS: u128 = 1_000;

/// Chunking errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("invalid chunk bounds: min {min}, max {max}")]
    InvalidBounds { min: u128, max: u128 },

    #[error("shortfall {shortfall} is below the provider minimum {min}")]
    BelowMinimum { shortfall: u128, min: u128 },

    #[error("shortfall {shortfall} needs more than {limit} payments of at most {max}")]
    TooManyChunks { shortfall: u128, max: u128, limit: u128 },
}

/// Split `shortfall` into chunks within `(0, max]`
///
/// Greedy by `max`. A remainder below `min` borrows from the chunks before
/// it, nearest first, so only the tail of the split changes and every chunk
/// stays at or above `min`. When the full chunks cannot lend enough, the
/// remainder is merged into the previous chunk, capped at `max`, and the
/// overflow is kept as the trailing chunk: the only chunk allowed below `min`.
pub fn split(shortfall: u128, min: u128, max: u128) -> Result<Vec<u128>, ChunkError> {
    if min == 0 || min > max {
        return Err(ChunkError::InvalidBounds { min, max });
    }
    if shortfall < min {
        return Err(ChunkError::BelowMinimum { shortfall, min });
    }

    let full = shortfall / max;
    let remainder = shortfall % max;
    let count = full + u128::from(remainder > 0);
    if count > MAX_CHUNKS {
        return Err(ChunkError::TooManyChunks {
            shortfall,
            max,
            limit: MAX_CHUNKS,
        });
    }
    let mut chunks = vec![max; full as usize];

    if remainder == 0 {
        return Ok(chunks);
    }
    if remainder >= min {
        chunks.push(remainder);
        return Ok(chunks);
    }

    // Each full chunk can lend down to `min`
    let mut deficit = min - remainder;
    let capacity = (max - min).saturating_mul(full);
    if capacity < deficit {
        // merged tail exceeds `max`: cap it and the overflow is the remainder
        chunks.push(remainder);
        return Ok(chunks);
    }

    for chunk in chunks.iter_mut().rev() {
        if deficit == 0 {
            break;
        }
        let lend = deficit.min(*chunk - min);
        *chunk -= lend;
        deficit -= lend;
    }
    chunks.push(min);

    Ok(chunks)
}
