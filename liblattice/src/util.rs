use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;

#[cfg(test)]
#[ctor::ctor]
fn init_backtrace() {
    color_backtrace::install();
}

/// The log domain representation of a zero probability.
pub const LOGZERO: f64 = f64::NEG_INFINITY;

/// Symbols that mark sentence boundaries. These look like fillers
/// (they are bracketed) but they are never bypassed or dropped.
pub static SENTENCE_START_MARKERS: phf::Set<&'static str> = phf_set! {
    "<s>",
    "!SENT_START",
};

pub static SENTENCE_END_MARKERS: phf::Set<&'static str> = phf_set! {
    "</s>",
    "!SENT_END",
};

lazy_static! {
    // matches <sil>, <noise>, ++breath++, +um+ and so on; a lone + is both ends
    static ref FILLER_RE: Regex = Regex::new(r"^(<.*>|\+(.*\+)?)$").unwrap();
}

/// Returns true if `symbol` is a filler word: anything bracketed by `<...>`
/// or `+...+` (including `+` on its own), except for the sentence
/// boundary markers.
pub fn is_filler(symbol: &str) -> bool {
    if SENTENCE_START_MARKERS.contains(symbol) || SENTENCE_END_MARKERS.contains(symbol) {
        return false;
    }
    FILLER_RE.is_match(symbol)
}

/// For `x = ln(a)` and `y = ln(b)`, returns `ln(a + b)`.
///
/// `LOGZERO` is absorbing: `log_add(x, LOGZERO) == x`.
#[inline(always)]
pub fn log_add(x: f64, y: f64) -> f64 {
    let (max, min) = if x >= y { (x, y) } else { (y, x) };

    debug_assert!(!x.is_nan());
    debug_assert!(!y.is_nan());

    if min == LOGZERO {
        max
    } else {
        max + (min - max).exp().ln_1p()
    }
}

#[macro_export]
macro_rules! log_sum {
    // Base case:
    ($x:expr) => ($x);
    // `$x` followed by at least one `$y,`
    ($x:expr, $($y:expr),+) => (
        // Call `log_sum!` on the tail `$y`
        $crate::util::log_add($x, $crate::log_sum!($($y),+))
    )
}

pub trait LogSum {
    fn log_sum(self) -> f64;
}

impl<I> LogSum for I
where
    I: Iterator<Item = f64>,
{
    fn log_sum(self) -> f64 {
        self.fold(LOGZERO, log_add)
    }
}
