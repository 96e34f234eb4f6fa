use crate::execution::bytecode::Indices;
use crate::execution::registers::IndexRange;

/// skip `offset` rows of a range, then keep at most `limit`
pub fn limit_range(range: &mut IndexRange, offset: usize, limit: Option<usize>) {
    let skip = offset.min(range.len()) as u32;
    range.start += skip;
    if let Some(limit) = limit {
        let keep = limit.min(range.len()) as u32;
        range.end = range.start + keep;
    }
}

/// skip the first `offset` indices, then keep at most `limit`
pub fn limit_indices(indices: &mut Indices, offset: usize, limit: Option<usize>) {
    let len = indices.len();
    let skip = offset.min(len);
    let keep = limit.map_or(len - skip, |limit| limit.min(len - skip));
    if skip > 0 {
        indices.as_mut_slice().copy_within(skip..skip + keep, 0);
    }
    indices.truncate(keep);
}
