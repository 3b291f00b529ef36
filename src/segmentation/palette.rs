use super::types::Mask;
use std::collections::BTreeMap;

/// Label colors, one per PASCAL VOC class.
pub const PALETTE: [[u8; 3]; 21] = [
    [45, 52, 54],
    [85, 239, 196],
    [129, 236, 236],
    [116, 185, 255],
    [162, 155, 254],
    [223, 230, 233],
    [0, 184, 148],
    [0, 206, 201],
    [9, 132, 227],
    [39, 60, 117],
    [108, 92, 231],
    [178, 190, 195],
    [255, 234, 167],
    [250, 177, 160],
    [255, 118, 117],
    [253, 121, 168],
    [99, 110, 114],
    [253, 203, 110],
    [225, 112, 85],
    [214, 48, 49],
    [232, 67, 147],
];

/// Color of a class; indices past the table reuse the last entry, which is
/// what clamp-to-edge sampling of the palette texture yields.
pub fn color(class: usize) -> [u8; 3] {
    PALETTE[class.min(PALETTE.len() - 1)]
}

/// The palette as packed RGB bytes, one texel per class.
pub fn palette_bytes() -> Vec<u8> {
    PALETTE.iter().flatten().copied().collect()
}

/// One legend row: class name and its overlay color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendEntry {
    pub name: String,
    pub rgb: [u8; 3],
}

/// Classes present in a label mask, keyed by class index.
pub type Legend = BTreeMap<usize, LegendEntry>;

pub fn build_legend(labels: &Mask, names: &[String]) -> Legend {
    labels
        .distinct()
        .into_iter()
        .map(|class| {
            let class = class as usize;
            let name = names
                .get(class)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            (
                class,
                LegendEntry {
                    name,
                    rgb: color(class),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_class_color() {
        assert_eq!(color(15), [253, 121, 168]);
    }

    #[test]
    fn out_of_range_class_clamps() {
        assert_eq!(color(200), PALETTE[20]);
    }

    #[test]
    fn legend_lists_distinct_classes() {
        let mask = Mask::from_vec(4, 1, vec![0, 15, 15, 0]).unwrap();
        let names: Vec<String> = (0..21).map(|i| format!("c{i}")).collect();
        let legend = build_legend(&mask, &names);
        assert_eq!(legend.len(), 2);
        assert_eq!(legend[&15].name, "c15");
        assert_eq!(legend[&15].rgb, [253, 121, 168]);
        assert_eq!(legend[&0].rgb, [45, 52, 54]);
    }
}
