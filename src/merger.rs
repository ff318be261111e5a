//! Two-way merger and merge tree.

use crate::sort::SortError;

/// Pending head element of a merge input.
struct Head<T, I> {
    input: I,
    item: Option<T>,
    exhausted: bool,
}

impl<T, I> Head<T, I>
where
    I: Iterator<Item = Result<T, SortError>>,
{
    fn new(input: I) -> Self {
        Head {
            input,
            item: None,
            exhausted: false,
        }
    }

    /// Pulls the next element from the input if no element is pending.
    fn fill(&mut self) -> Result<(), SortError> {
        if self.item.is_none() && !self.exhausted {
            match self.input.next() {
                Some(Ok(item)) => self.item = Some(item),
                Some(Err(err)) => return Err(err),
                None => self.exhausted = true,
            }
        }

        return Ok(());
    }
}

/// Two-way merger implementation.
/// Merges two sorted inputs into a single sorted output keeping all duplicates.
/// Equal items are emitted from the left input first.
/// Inputs should be sorted in ascending order otherwise the result is undefined.
pub struct TwoWayMerger<T, L, R> {
    left: Head<T, L>,
    right: Head<T, R>,
    finished: bool,
}

impl<T, L, R> TwoWayMerger<T, L, R>
where
    T: Ord,
    L: Iterator<Item = Result<T, SortError>>,
    R: Iterator<Item = Result<T, SortError>>,
{
    /// Creates an instance of a two-way merger.
    ///
    /// # Arguments
    /// * `left` - Left input, wins ties
    /// * `right` - Right input
    pub fn new(left: impl IntoIterator<IntoIter = L>, right: impl IntoIterator<IntoIter = R>) -> Self {
        TwoWayMerger {
            left: Head::new(left.into_iter()),
            right: Head::new(right.into_iter()),
            finished: false,
        }
    }

    fn next_item(&mut self) -> Result<Option<T>, SortError> {
        self.left.fill()?;
        self.right.fill()?;

        let take_left = match (&self.left.item, &self.right.item) {
            (Some(left), Some(right)) => left <= right,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return Ok(None),
        };

        return Ok(if take_left {
            self.left.item.take()
        } else {
            self.right.item.take()
        });
    }
}

impl<T, L, R> Iterator for TwoWayMerger<T, L, R>
where
    T: Ord,
    L: Iterator<Item = Result<T, SortError>>,
    R: Iterator<Item = Result<T, SortError>>,
{
    type Item = Result<T, SortError>;

    /// Returns the next item from the inputs in ascending order.
    /// An input error is returned once and ends the merged output.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = self.next_item();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }

        result.transpose()
    }
}

/// Builds a balanced binary merge tree over the provided sorted streams.
///
/// A single stream is returned as is. Otherwise the list is split into a left half of `⌈n/2⌉` streams
/// and a right half of `⌊n/2⌋` streams, both halves are built recursively and joined by `merge`.
/// The resulting tree has depth `⌈log2 n⌉`. Returns [`None`] if there are no streams.
///
/// # Arguments
/// * `streams` - Sorted streams to be merged
/// * `merge` - Function joining two sorted streams into one
pub fn build_merge_tree<S, F>(mut streams: Vec<S>, merge: &mut F) -> Option<S>
where
    F: FnMut(S, S) -> S,
{
    match streams.len() {
        0 => None,
        1 => streams.pop(),
        len => {
            let right_streams = streams.split_off((len + 1) / 2);
            let left = build_merge_tree(streams, merge)?;
            let right = build_merge_tree(right_streams, merge)?;

            Some(merge(left, right))
        }
    }
}

/// Boxed sorted stream.
pub type BoxedStream<'a, T> = Box<dyn Iterator<Item = Result<T, SortError>> + 'a>;

/// Lazy single-threaded merge of any number of sorted inputs through a merge tree.
/// Returns an empty iterator if there are no inputs.
pub fn merge_all<'a, T, I>(inputs: Vec<I>) -> BoxedStream<'a, T>
where
    T: Ord + 'a,
    I: IntoIterator<Item = Result<T, SortError>>,
    I::IntoIter: 'a,
{
    let inputs = Vec::from_iter(
        inputs
            .into_iter()
            .map(|input| -> BoxedStream<'a, T> { Box::new(input.into_iter()) }),
    );

    let merged = build_merge_tree(inputs, &mut |left, right| -> BoxedStream<'a, T> {
        Box::new(TwoWayMerger::new(left, right))
    });

    merged.unwrap_or_else(|| Box::new(std::iter::empty()))
}
