//! Linear time suffix array construction by induced sorting (SA-IS).
//!
//! No sentinel is required: the end of the text is treated as a virtual symbol that is smaller
//! than every real symbol. Entries are `u32`, so the text must be shorter than `u32::MAX`.

/// Marks an empty slot of the suffix array under construction
const EMPTY: u32 = u32::MAX;

/// The longest text that can be sorted
pub const MAX_TEXT_LENGTH: usize = u32::MAX as usize - 1;

/// A symbol of the (possibly reduced) text
trait Symbol: Copy + Ord {
    fn index(self) -> usize;
}

impl Symbol for u8 {
    fn index(self) -> usize {
        self as usize
    }
}

impl Symbol for u32 {
    fn index(self) -> usize {
        self as usize
    }
}

/// Builds the suffix array of `text`
///
/// # Arguments
/// * `text` - The text to sort, at most `MAX_TEXT_LENGTH` bytes long
///
/// # Returns
///
/// Returns the start positions of all suffixes of `text` in lexicographic order
pub fn suffix_array(text: &[u8]) -> Vec<u32> {
    debug_assert!(text.len() <= MAX_TEXT_LENGTH);
    sa_is(text, u8::MAX as usize)
}

/// Bucket boundaries of the text, `bucket_l[c]` is where the L-type suffixes starting with `c`
/// begin and `bucket_s[c]` where the S-type ones begin. The end of bucket `c` is
/// `bucket_l[c + 1]`.
struct Buckets {
    bucket_l: Vec<usize>,
    bucket_s: Vec<usize>,
}

impl Buckets {
    fn new<T: Symbol>(text: &[T], s_type: &[bool], upper: usize) -> Self {
        let mut bucket_l = vec![0; upper + 1];
        let mut bucket_s = vec![0; upper + 1];

        for (&symbol, &is_s) in text.iter().zip(s_type) {
            if is_s {
                // an S-type symbol is never the largest symbol
                bucket_l[symbol.index() + 1] += 1;
            } else {
                bucket_s[symbol.index()] += 1;
            }
        }

        for c in 0..=upper {
            bucket_s[c] += bucket_l[c];
            if c < upper {
                bucket_l[c + 1] += bucket_s[c];
            }
        }

        Self { bucket_l, bucket_s }
    }
}

/// Induces the order of all suffixes from the given (sorted) LMS suffixes
fn induce<T: Symbol>(text: &[T], s_type: &[bool], buckets: &Buckets, lms: &[u32], sa: &mut [u32]) {
    let n = text.len();
    sa.fill(EMPTY);

    let mut heads = buckets.bucket_s.clone();
    for &position in lms {
        let c = text[position as usize].index();
        sa[heads[c]] = position;
        heads[c] += 1;
    }

    // the last suffix is L-type and the smallest in its bucket
    heads.copy_from_slice(&buckets.bucket_l);
    let c = text[n - 1].index();
    sa[heads[c]] = (n - 1) as u32;
    heads[c] += 1;

    for i in 0..n {
        let position = sa[i];
        if position != EMPTY && position > 0 && !s_type[position as usize - 1] {
            let c = text[position as usize - 1].index();
            sa[heads[c]] = position - 1;
            heads[c] += 1;
        }
    }

    let mut tails = heads;
    tails.copy_from_slice(&buckets.bucket_l);
    for i in (0..n).rev() {
        let position = sa[i];
        if position != EMPTY && position > 0 && s_type[position as usize - 1] {
            let c = text[position as usize - 1].index() + 1;
            tails[c] -= 1;
            sa[tails[c]] = position - 1;
        }
    }
}

fn sa_is<T: Symbol>(text: &[T], upper: usize) -> Vec<u32> {
    let n = text.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![0],
        2 => return if text[0] < text[1] { vec![0, 1] } else { vec![1, 0] },
        _ => {}
    }

    // classify every suffix, the last one is L-type because of the virtual sentinel
    let mut s_type = vec![false; n];
    for i in (0..n - 1).rev() {
        s_type[i] = if text[i] == text[i + 1] {
            s_type[i + 1]
        } else {
            text[i] < text[i + 1]
        };
    }

    let buckets = Buckets::new(text, &s_type, upper);

    let mut lms_rank = vec![EMPTY; n];
    let mut lms = Vec::new();
    for i in 1..n {
        if !s_type[i - 1] && s_type[i] {
            lms_rank[i] = lms.len() as u32;
            lms.push(i as u32);
        }
    }

    let mut sa = vec![EMPTY; n];
    induce(text, &s_type, &buckets, &lms, &mut sa);

    if lms.is_empty() {
        return sa;
    }

    // the LMS substrings are now sorted, name them so equal substrings get equal names
    let sorted_lms: Vec<u32> = sa
        .iter()
        .copied()
        .filter(|&position| lms_rank[position as usize] != EMPTY)
        .collect();
    let lms_end = |position: usize| {
        let next = lms_rank[position] as usize + 1;
        if next < lms.len() {
            lms[next] as usize
        } else {
            n
        }
    };

    let mut reduced_text = vec![0_u32; lms.len()];
    let mut name = 0;
    for pair in sorted_lms.windows(2) {
        let (mut l, mut r) = (pair[0] as usize, pair[1] as usize);
        let (end_l, end_r) = (lms_end(l), lms_end(r));

        let mut same = end_l - l == end_r - r;
        if same {
            while l < end_l && text[l] == text[r] {
                l += 1;
                r += 1;
            }
            same = l == end_l && l < n && r < n && text[l] == text[r];
        }

        if !same {
            name += 1;
        }
        reduced_text[lms_rank[pair[1] as usize] as usize] = name;
    }

    // sort the LMS suffixes by sorting the suffixes of the reduced text
    let reduced_sa = sa_is(&reduced_text, name as usize);
    let sorted_lms: Vec<u32> = reduced_sa.iter().map(|&rank| lms[rank as usize]).collect();

    induce(text, &s_type, &buckets, &sorted_lms, &mut sa);
    sa
}
