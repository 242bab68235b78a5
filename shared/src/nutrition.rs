use crate::classifier::ClassificationItem;

pub const VEGETABLE_KEYWORD: &str = "vegetable";
pub const TIP_HEALTHY_PLATE: &str = "Healthy food on the plate.";
pub const TIP_ADD_VEGETABLES: &str = "Add more vegetables to your plate!";

/// True when any label contains `keyword`, ignoring case.
/// "Vegetables" and "leafy vegetable" both match "vegetable".
pub fn contains_category(items: &[ClassificationItem], keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    items
        .iter()
        .any(|item| item.name.to_lowercase().contains(&keyword))
}

pub fn tip_for(items: &[ClassificationItem]) -> &'static str {
    if contains_category(items, VEGETABLE_KEYWORD) {
        TIP_HEALTHY_PLATE
    } else {
        TIP_ADD_VEGETABLES
    }
}
