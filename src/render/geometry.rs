//! Page size, orientation and margin resolution.

use crate::backend::Size;
use crate::error::{Error, Result};
use crate::model::{DrawableItem, HeightSpec, MarginSpec, Orientation, Page, PageSizeSpec, Shape};

/// Standard paper sizes in points, portrait.
const PAGE_SIZES: &[(&str, f32, f32)] = &[
    ("4A0", 4768.82, 6741.73),
    ("2A0", 3370.39, 4768.82),
    ("A0", 2383.94, 3370.39),
    ("A1", 1683.78, 2383.94),
    ("A2", 1190.55, 1683.78),
    ("A3", 841.89, 1190.55),
    ("A4", 595.28, 841.89),
    ("A5", 419.53, 595.28),
    ("A6", 297.64, 419.53),
    ("A7", 209.76, 297.64),
    ("A8", 147.40, 209.76),
    ("A9", 104.88, 147.40),
    ("A10", 73.70, 104.88),
    ("B0", 2834.65, 4008.19),
    ("B1", 2004.09, 2834.65),
    ("B2", 1417.32, 2004.09),
    ("B3", 1000.63, 1417.32),
    ("B4", 708.66, 1000.63),
    ("B5", 498.90, 708.66),
    ("B6", 354.33, 498.90),
    ("B7", 249.45, 354.33),
    ("B8", 175.75, 249.45),
    ("B9", 124.72, 175.75),
    ("B10", 87.87, 124.72),
    ("C0", 2599.37, 3676.54),
    ("C1", 1836.85, 2599.37),
    ("C2", 1298.27, 1836.85),
    ("C3", 918.43, 1298.27),
    ("C4", 649.13, 918.43),
    ("C5", 459.21, 649.13),
    ("C6", 323.15, 459.21),
    ("C7", 229.61, 323.15),
    ("C8", 161.57, 229.61),
    ("C9", 113.39, 161.57),
    ("C10", 79.37, 113.39),
    ("RA0", 2437.80, 3458.27),
    ("RA1", 1729.13, 2437.80),
    ("RA2", 1218.90, 1729.13),
    ("RA3", 864.57, 1218.90),
    ("RA4", 609.45, 864.57),
    ("SRA0", 2551.18, 3628.35),
    ("SRA1", 1814.17, 2551.18),
    ("SRA2", 1275.59, 1814.17),
    ("SRA3", 907.09, 1275.59),
    ("SRA4", 637.80, 907.09),
    ("EXECUTIVE", 521.86, 756.00),
    ("FOLIO", 612.00, 936.00),
    ("LEGAL", 612.00, 1008.00),
    ("LETTER", 612.00, 792.00),
    ("TABLOID", 792.00, 1224.00),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageHeight {
    Fixed(f32),
    /// Unbounded during layout; fixed afterwards by [`compute_auto_height`].
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: PageHeight,
    pub orientation: Orientation,
}

impl PageGeometry {
    /// Physical size, or `None` while the height is still auto.
    pub fn fixed_size(&self) -> Option<Size> {
        match self.height {
            PageHeight::Fixed(h) => Some(Size::new(self.width, h)),
            PageHeight::Auto => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

pub fn named_page_size(name: &str) -> Option<Size> {
    PAGE_SIZES
        .iter()
        .find(|(n, _, _)| n.eq_ignore_ascii_case(name.trim()))
        .map(|&(_, w, h)| Size::new(w, h))
}

/// Resolve a requested size and orientation to page dimensions, swapping width
/// and height when the orientation asks for it.
pub fn resolve_page_geometry(
    requested: &PageSizeSpec,
    orientation: Orientation,
) -> Result<PageGeometry> {
    let (width, height) = match requested {
        PageSizeSpec::Named(name) => {
            let size = named_page_size(name)
                .ok_or_else(|| Error::Config(format!("unknown page size {name:?}")))?;
            (size.width, PageHeight::Fixed(size.height))
        }
        PageSizeSpec::Explicit { width, height } => {
            let height = match height {
                HeightSpec::Points(h) => PageHeight::Fixed(*h),
                HeightSpec::Keyword(k) if k.eq_ignore_ascii_case("auto") => PageHeight::Auto,
                HeightSpec::Keyword(k) => {
                    return Err(Error::Config(format!("invalid page height {k:?}")));
                }
            };
            (*width, height)
        }
        PageSizeSpec::Other(value) => {
            return Err(Error::Config(format!("invalid page size {value}")));
        }
    };

    if !(width > 0.0) || matches!(height, PageHeight::Fixed(h) if !(h > 0.0)) {
        return Err(Error::Config(format!(
            "page dimensions must be positive, got width {width} and height {height:?}"
        )));
    }

    match height {
        PageHeight::Auto if orientation == Orientation::Landscape => Err(Error::Config(
            "auto page height cannot be combined with landscape orientation".to_string(),
        )),
        PageHeight::Auto => Ok(PageGeometry {
            width,
            height,
            orientation: Orientation::Portrait,
        }),
        PageHeight::Fixed(h) => {
            let mut size = Size::new(width, h);
            if size.orientation() != orientation && size.width != size.height {
                size = size.swapped();
            }
            Ok(PageGeometry {
                width: size.width,
                height: PageHeight::Fixed(size.height),
                orientation: size.orientation(),
            })
        }
    }
}

/// Expand margin shorthand: scalar, `[horizontal, vertical]` or
/// `[left, top, right, bottom]`.
pub fn resolve_margins(margin: &MarginSpec) -> Result<Margins> {
    match margin {
        MarginSpec::Uniform(m) => Ok(Margins {
            left: *m,
            top: *m,
            right: *m,
            bottom: *m,
        }),
        MarginSpec::Sides(sides) => match sides.as_slice() {
            &[horizontal, vertical] => Ok(Margins {
                left: horizontal,
                top: vertical,
                right: horizontal,
                bottom: vertical,
            }),
            &[left, top, right, bottom] => Ok(Margins {
                left,
                top,
                right,
                bottom,
            }),
            other => Err(Error::Config(format!(
                "page margins need 1, 2 or 4 values, got {}",
                other.len()
            ))),
        },
        MarginSpec::Other(value) => Err(Error::Config(format!("invalid page margins {value}"))),
    }
}

/// Bottom edge of an item, or `None` for kinds without an intrinsic height.
fn item_bottom(item: &DrawableItem) -> Option<f32> {
    match item {
        DrawableItem::Line(line) => Some(line.y + line.height),
        DrawableItem::Image(image) => Some(image.y + image.height),
        DrawableItem::Svg(svg) => Some(svg.y + svg.height),
        DrawableItem::Vector(vector) => match &vector.shape {
            Shape::Rect { y, h, .. } => Some(y + h),
            Shape::Ellipse { y, r2, .. } => Some(y + r2),
            Shape::Line { y1, y2, .. } => Some(y1.max(*y2)),
            Shape::Polyline { points, .. } => points.iter().map(|p| p.y).reduce(f32::max),
            Shape::Path { .. } => None,
        },
        DrawableItem::BeginClip(_) | DrawableItem::EndClip => None,
    }
}

/// Height of a single continuous page holding every item of `pages`.
pub fn compute_auto_height(pages: &[Page], margins: &Margins) -> f32 {
    let mut bottom = margins.top;
    let mut skipped = 0usize;
    for item in pages.iter().flat_map(|p| &p.items) {
        match item_bottom(item) {
            Some(b) => bottom = bottom.max(b),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::debug!("Auto height: {skipped} items without intrinsic height counted as 0");
    }
    bottom + margins.bottom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_sizes_ignore_case() {
        let geometry = resolve_page_geometry(&PageSizeSpec::Named("letter".into()), Orientation::Portrait).unwrap();
        assert_eq!(geometry.fixed_size(), Some(Size::new(612.0, 792.0)));
    }

    #[test]
    fn landscape_swaps_portrait_size() {
        let geometry = resolve_page_geometry(&PageSizeSpec::Named("A4".into()), Orientation::Landscape).unwrap();
        assert_eq!(geometry.fixed_size(), Some(Size::new(841.89, 595.28)));
        assert_eq!(geometry.orientation, Orientation::Landscape);
    }

    #[test]
    fn explicit_landscape_size_swaps_for_portrait() {
        let requested = PageSizeSpec::Explicit {
            width: 800.0,
            height: HeightSpec::Points(600.0),
        };
        let geometry = resolve_page_geometry(&requested, Orientation::Portrait).unwrap();
        assert_eq!(geometry.fixed_size(), Some(Size::new(600.0, 800.0)));
    }

    #[test]
    fn auto_height_is_kept_for_portrait() {
        let requested = PageSizeSpec::Explicit {
            width: 300.0,
            height: HeightSpec::Keyword("auto".into()),
        };
        let geometry = resolve_page_geometry(&requested, Orientation::Portrait).unwrap();
        assert_eq!(geometry.height, PageHeight::Auto);
        assert!(resolve_page_geometry(&requested, Orientation::Landscape).is_err());
    }
}
