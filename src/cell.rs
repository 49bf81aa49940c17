//! Typed table cells and their per-type ordering rules.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a table column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Int,
    Double,
    Text,
}

impl ColumnType {
    /// Parses a textual cell value into a cell of this type.
    /// An empty string is a missing cell.
    pub fn parse(&self, value: &str) -> Result<Cell, String> {
        if value.is_empty() {
            return Ok(Cell::Missing);
        }

        match self {
            ColumnType::Boolean => value
                .parse::<bool>()
                .map(Cell::Boolean)
                .map_err(|err| format!("'{}' is not a boolean: {}", value, err)),
            ColumnType::Int => value
                .parse::<i64>()
                .map(Cell::Int)
                .map_err(|err| format!("'{}' is not an integer: {}", value, err)),
            ColumnType::Double => value
                .parse::<f64>()
                .map(Cell::Double)
                .map_err(|err| format!("'{}' is not a double: {}", value, err)),
            ColumnType::Text => Ok(Cell::Text(value.to_string())),
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "int" | "integer" | "long" => Ok(ColumnType::Int),
            "double" | "float" => Ok(ColumnType::Double),
            "text" | "string" | "str" => Ok(ColumnType::Text),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

/// Where missing cells sort relative to every other value, before the sort direction is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MissingOrder {
    /// Missing cells are smaller than any value (first in ascending order).
    Smallest,
    /// Missing cells are greater than any value (last in ascending order).
    Largest,
}

impl Default for MissingOrder {
    fn default() -> Self {
        MissingOrder::Smallest
    }
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub enum Cell {
    Missing,
    Boolean(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    // cross-type rank, used only when a column holds cells of unrelated types
    fn rank(&self) -> u8 {
        match self {
            Cell::Missing => 0,
            Cell::Boolean(_) => 1,
            Cell::Int(_) | Cell::Double(_) => 2,
            Cell::Text(_) => 3,
        }
    }

    /// Compares two cells of the same column.
    ///
    /// Missing cells are placed according to `missing`; everything else follows
    /// the per-type rules: booleans `false < true`, numbers numerically
    /// (IEEE total order for doubles, ints against doubles exactly), text byte-wise.
    pub fn compare(&self, other: &Cell, missing: MissingOrder) -> Ordering {
        match (self, other) {
            (Cell::Missing, Cell::Missing) => Ordering::Equal,
            (Cell::Missing, _) => match missing {
                MissingOrder::Smallest => Ordering::Less,
                MissingOrder::Largest => Ordering::Greater,
            },
            (_, Cell::Missing) => match missing {
                MissingOrder::Smallest => Ordering::Greater,
                MissingOrder::Largest => Ordering::Less,
            },
            (Cell::Boolean(a), Cell::Boolean(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Double(a), Cell::Double(b)) => a.total_cmp(b),
            (Cell::Int(a), Cell::Double(b)) => compare_int_double(*a, *b),
            (Cell::Double(a), Cell::Int(b)) => compare_int_double(*b, *a).reverse(),
            (Cell::Text(a), Cell::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

// 2^63, the first double above i64::MAX
const I64_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a double, consistent with `i64::cmp` and `f64::total_cmp`.
///
/// An integer sits where the same real number sits among doubles; zero counts as `+0.0`, so it
/// is greater than `-0.0`. NaNs keep their total order position beyond the infinities.
fn compare_int_double(int: i64, double: f64) -> Ordering {
    if double.is_nan() {
        return if double.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }

    let whole = double.trunc();
    if whole >= I64_UPPER_BOUND {
        return Ordering::Less;
    }
    if whole < -I64_UPPER_BOUND {
        return Ordering::Greater;
    }

    // whole is an integer within [i64::MIN, i64::MAX], the cast is exact
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => {}
        ord => return ord,
    }

    let fraction = double - whole;
    if fraction > 0.0 {
        Ordering::Less
    } else if fraction < 0.0 {
        Ordering::Greater
    } else if double.is_sign_negative() && int == 0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => Ok(()),
            Cell::Boolean(value) => write!(f, "{}", value),
            Cell::Int(value) => write!(f, "{}", value),
            Cell::Double(value) => write!(f, "{}", value),
            Cell::Text(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{Cell, ColumnType, MissingOrder};

    #[rstest]
    #[case(Cell::Int(1), Cell::Int(2), Ordering::Less)]
    #[case(Cell::Int(-5), Cell::Int(-5), Ordering::Equal)]
    #[case(Cell::Boolean(true), Cell::Boolean(false), Ordering::Greater)]
    #[case(Cell::Double(-0.0), Cell::Double(0.0), Ordering::Less)]
    #[case(Cell::Double(f64::NAN), Cell::Double(f64::INFINITY), Ordering::Greater)]
    #[case(Cell::Int(3), Cell::Double(2.5), Ordering::Greater)]
    #[case(Cell::Int(-3), Cell::Double(-2.5), Ordering::Less)]
    #[case(Cell::Int(2), Cell::Double(2.0), Ordering::Equal)]
    #[case(Cell::Int(0), Cell::Double(0.0), Ordering::Equal)]
    #[case(Cell::Int(0), Cell::Double(-0.0), Ordering::Greater)]
    #[case(Cell::Int(i64::MAX), Cell::Double(f64::INFINITY), Ordering::Less)]
    #[case(Cell::Int(i64::MAX), Cell::Double(9_223_372_036_854_775_808.0), Ordering::Less)]
    #[case(Cell::Int(i64::MIN), Cell::Double(-9_223_372_036_854_775_808.0), Ordering::Equal)]
    #[case(Cell::Int(i64::MIN), Cell::Double(-1e300), Ordering::Greater)]
    #[case(Cell::Int(i64::MIN), Cell::Double(f64::NAN), Ordering::Less)]
    #[case(Cell::Int(i64::MAX), Cell::Double(-f64::NAN), Ordering::Greater)]
    #[case(Cell::Int(9_007_199_254_740_993), Cell::Double(9_007_199_254_740_992.0), Ordering::Greater)]
    #[case(Cell::Text("B".into()), Cell::Text("a".into()), Ordering::Less)]
    #[case(Cell::Int(100), Cell::Text("1".into()), Ordering::Less)]
    #[case(Cell::Boolean(true), Cell::Double(-1.0), Ordering::Less)]
    fn test_cell_compare(#[case] a: Cell, #[case] b: Cell, #[case] expected: Ordering) {
        assert_eq!(a.compare(&b, MissingOrder::Smallest), expected);
        assert_eq!(b.compare(&a, MissingOrder::Smallest), expected.reverse());
    }

    #[test]
    fn test_mixed_numbers_are_totally_ordered() {
        let big = 1i64 << 53;
        let cells = vec![
            Cell::Int(big),
            Cell::Int(big + 1),
            Cell::Int(big - 1),
            Cell::Double(big as f64),
            Cell::Double((big + 2) as f64),
            Cell::Double(-0.0),
            Cell::Double(0.0),
            Cell::Int(0),
            Cell::Double(0.5),
            Cell::Int(-1),
            Cell::Double(-0.5),
            Cell::Double(f64::NAN),
            Cell::Double(f64::NEG_INFINITY),
            Cell::Int(i64::MAX),
            Cell::Int(i64::MIN),
        ];

        for a in &cells {
            for b in &cells {
                let ab = a.compare(b, MissingOrder::Smallest);
                assert_eq!(b.compare(a, MissingOrder::Smallest), ab.reverse());
                for c in &cells {
                    let bc = b.compare(c, MissingOrder::Smallest);
                    let ac = a.compare(c, MissingOrder::Smallest);
                    if ab == bc {
                        assert_eq!(ac, ab, "{:?} {:?} {:?}", a, b, c);
                    }
                    if ab == Ordering::Equal {
                        assert_eq!(ac, bc, "{:?} {:?} {:?}", a, b, c);
                    }
                }
            }
        }

        assert_eq!(Cell::Int(big).compare(&Cell::Int(big + 1), MissingOrder::Smallest), Ordering::Less);
        assert_eq!(Cell::Int(big).compare(&Cell::Double(big as f64), MissingOrder::Smallest), Ordering::Equal);
        assert_eq!(Cell::Double(big as f64).compare(&Cell::Int(big + 1), MissingOrder::Smallest), Ordering::Less);
    }

    #[rstest]
    #[case(MissingOrder::Smallest, Ordering::Less)]
    #[case(MissingOrder::Largest, Ordering::Greater)]
    fn test_missing_placement(#[case] missing: MissingOrder, #[case] expected: Ordering) {
        assert_eq!(Cell::Missing.compare(&Cell::Int(i64::MIN), missing), expected);
        assert_eq!(Cell::Missing.compare(&Cell::Missing, missing), Ordering::Equal);
    }

    #[rstest]
    #[case(ColumnType::Int, "42", Cell::Int(42))]
    #[case(ColumnType::Double, "1.5", Cell::Double(1.5))]
    #[case(ColumnType::Boolean, "true", Cell::Boolean(true))]
    #[case(ColumnType::Text, "abc", Cell::Text("abc".into()))]
    #[case(ColumnType::Int, "", Cell::Missing)]
    fn test_parse(#[case] ty: ColumnType, #[case] value: &str, #[case] expected: Cell) {
        assert_eq!(ty.parse(value).unwrap(), expected);
    }

    #[test]
    fn test_parse_error() {
        assert!(ColumnType::Int.parse("x1").is_err());
        assert!("blob".parse::<ColumnType>().is_err());
    }
}
