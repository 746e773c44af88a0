/// Days from manufacture to expiry, keyed by lower-case food name.
const SHELF_LIFE_DAYS: &[(&str, i64)] = &[
    ("milk", 7),
    ("bread", 5),
    ("eggs", 21),
    ("yogurt", 14),
    ("bananas", 4),
    ("cereal bar", 180),
    ("canned food", 720),
    ("juice", 365),
    ("rice", 365),
    ("pasta", 365),
];

pub fn days_for(food_name: &str) -> Option<i64> {
    let key = food_name.trim().to_lowercase();
    SHELF_LIFE_DAYS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, days)| *days)
}

#[cfg(test)]
mod tests {
    use super::days_for;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(days_for("Milk"), Some(7));
        assert_eq!(days_for("CANNED FOOD"), Some(720));
    }

    #[test]
    fn unknown_food_has_no_entry() {
        assert_eq!(days_for("caviar"), None);
        assert_eq!(days_for(""), None);
    }
}
