//! Drawing dictionary markers.

use fidpose_core::GrayImage;

use crate::Dictionary;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("marker id {id} is out of range for {dictionary} ({len} markers)")]
    UnknownId {
        id: u32,
        dictionary: &'static str,
        len: usize,
    },
    #[error("{side} pixels cannot hold {cells} cells")]
    TooSmall { side: usize, cells: usize },
}

/// Render marker `id` as a `side x side` image: black border of
/// `border_bits` cells around the code, white cells at 255.
///
/// Cells are sized `side / cells`; when that does not divide evenly the
/// nearest cell is used per pixel.
pub fn render_marker(
    dict: &Dictionary,
    id: u32,
    side: usize,
    border_bits: usize,
) -> Result<GrayImage, RenderError> {
    let code = *dict.codes.get(id as usize).ok_or(RenderError::UnknownId {
        id,
        dictionary: dict.name,
        len: dict.len(),
    })?;
    let n = dict.marker_size;
    let cells = n + 2 * border_bits;
    if side < cells {
        return Err(RenderError::TooSmall { side, cells });
    }

    let mut img = GrayImage::filled(side, side, 0);
    for y in 0..side {
        let cy = y * cells / side;
        for x in 0..side {
            let cx = x * cells / side;
            let inner = (border_bits..border_bits + n).contains(&cx)
                && (border_bits..border_bits + n).contains(&cy);
            if inner && (code >> ((cy - border_bits) * n + cx - border_bits)) & 1 == 1 {
                img.data[y * side + x] = 255;
            }
        }
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;

    #[test]
    fn marker_zero_first_row_matches_code() {
        let dict = builtins::DICT_4X4_50;
        let img = render_marker(&dict, 0, 60, 1).expect("render");
        let v = img.view();
        // Border cells are black.
        assert_eq!(v.get(5, 5), 0);
        assert_eq!(v.get(55, 30), 0);
        // First code row is 1011.
        let row: Vec<u8> = (0..4).map(|x| v.get(15 + 10 * x, 15)).collect();
        assert_eq!(row, vec![255, 0, 255, 255]);
    }

    #[test]
    fn out_of_range_id_and_tiny_side_fail() {
        let dict = builtins::DICT_4X4_50;
        assert!(matches!(
            render_marker(&dict, 50, 60, 1),
            Err(RenderError::UnknownId { id: 50, .. })
        ));
        assert_eq!(
            render_marker(&dict, 0, 5, 1),
            Err(RenderError::TooSmall { side: 5, cells: 6 })
        );
    }
}
