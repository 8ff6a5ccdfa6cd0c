//! Column naming
//!
//! The engine reads model probabilities and writes calibration and
//! prediction tables through fixed column names. Downstream consumers key on
//! these names, so they are part of the output contract and are produced
//! only through the helpers here.

/// Calibration table: nonconformity probability column (classification).
pub const CALIBRATION_P: &str = "P";
/// Calibration table: nonconformity score column (regression).
pub const CALIBRATION_ALPHA: &str = "Alpha";
/// Calibration table: rank column.
pub const CALIBRATION_RANK: &str = "Rank";
/// Fold-tagged tables: fold index column.
pub const ITERATION: &str = "Iteration";
/// Fold-tagged prediction table: aggregation key column.
pub const ORIGINAL_ROW_ID: &str = "Original RowId";

/// Name of a model probability column for one class of a target.
///
/// * `target` - Name of the target column.
/// * `value` - Class label.
pub fn probability(target: &str, value: &str) -> String {
    format!("P ({}={})", target, value)
}

/// Prefix shared by all probability columns of one target.
pub fn probability_prefix(target: &str) -> String {
    format!("P ({}=", target)
}

/// Extract the class label from a probability column name, if the column
/// belongs to the given target.
pub fn probability_class<'a>(column: &'a str, target: &str) -> Option<&'a str> {
    column
        .strip_prefix("P (")?
        .strip_suffix(')')?
        .strip_prefix(target)?
        .strip_prefix('=')
}

/// Name of the prediction p-value column for one class.
pub fn p_value(value: &str) -> String {
    format!("p-value ({})", value)
}

/// Extract the class label from a prediction p-value column name.
pub fn p_value_class(column: &str) -> Option<&str> {
    column.strip_prefix("p-value (")?.strip_suffix(')')
}

/// Name of the prediction rank column for one class.
pub fn rank(value: &str) -> String {
    format!("Rank ({})", value)
}

/// Name of the regression lower bound column.
pub fn lower_bound(target: &str) -> String {
    format!("Lower bound ({})", target)
}

/// Name of the regression upper bound column.
pub fn upper_bound(target: &str) -> String {
    format!("Upper bound ({})", target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        assert_eq!(probability("Species", "setosa"), "P (Species=setosa)");
        assert_eq!(p_value("setosa"), "p-value (setosa)");
        assert_eq!(rank("setosa"), "Rank (setosa)");
        assert_eq!(lower_bound("price"), "Lower bound (price)");
        assert_eq!(upper_bound("price"), "Upper bound (price)");
    }

    #[test]
    fn test_probability_class() {
        assert_eq!(
            probability_class("P (Species=setosa)", "Species"),
            Some("setosa")
        );
        assert_eq!(probability_class("P (Species=setosa)", "Other"), None);
        assert_eq!(probability_class("Species", "Species"), None);
        assert_eq!(probability_class("P (Species=a=b)", "Species"), Some("a=b"));
    }

    #[test]
    fn test_p_value_class() {
        assert_eq!(p_value_class("p-value (setosa)"), Some("setosa"));
        assert_eq!(p_value_class("P (Species=setosa)"), None);
        assert_eq!(p_value_class("Rank (setosa)"), None);
    }
}
