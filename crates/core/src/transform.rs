//! 旋转页面的显示坐标 ↔ 内部坐标转换
//!
//! 阅读器按 `/Rotate` 显示页面，人或模型画出的矩形都在显示坐标系里。
//! 页面内容存储在未旋转的坐标系中，区域必须先转换到这里，
//! 才能与文字、图片匹配或在其上绘制。
//!
//! 两个坐标系都以左上角为原点、y 轴向下；
//! [`internal_to_user_space`] 负责转换到用于绘制的 PDF 用户空间。

use crate::geometry::{Rect, Size};

/// 页面旋转（顺时针四分之一圈数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// 映射 `/Rotate` 值；0/90/180/270 以外返回 `None`
    pub fn from_degrees(degrees: i64) -> Option<Rotation> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Cw90),
            180 => Some(Rotation::Cw180),
            270 => Some(Rotation::Cw270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> i64 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// 显示时宽高是否互换
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }
}

/// 把显示坐标系下的矩形转换到页面内部坐标系
///
/// `internal` 为未旋转的页面尺寸（MediaBox 宽高）。
/// 未知的旋转值保持矩形不变。
pub fn to_internal(rect: Rect, rotation_degrees: i64, internal: Size) -> Rect {
    let Rect {
        x,
        y,
        width: w,
        height: h,
    } = rect;

    match Rotation::from_degrees(rotation_degrees) {
        Some(Rotation::Cw90) => Rect::new(internal.height - y - h, x, h, w),
        Some(Rotation::Cw180) => Rect::new(internal.width - x - w, internal.height - y - h, w, h),
        Some(Rotation::Cw270) => Rect::new(internal.width - y - h, x, h, w),
        Some(Rotation::None) | None => rect,
    }
}

/// [`to_internal`] 的逆变换
pub fn to_displayed(rect: Rect, rotation_degrees: i64, internal: Size) -> Rect {
    let Rect {
        x,
        y,
        width: w,
        height: h,
    } = rect;

    match Rotation::from_degrees(rotation_degrees) {
        Some(Rotation::Cw90) => Rect::new(y, internal.height - x - w, h, w),
        Some(Rotation::Cw180) => Rect::new(internal.width - x - w, internal.height - y - h, w, h),
        Some(Rotation::Cw270) => Rect::new(y, internal.width - x - w, h, w),
        Some(Rotation::None) | None => rect,
    }
}

/// 内部坐标（左上角原点）转换为 PDF 用户空间（左下角原点），
/// `media_box` 为 `[llx, lly, urx, ury]`
pub fn internal_to_user_space(rect: Rect, media_box: [f64; 4]) -> Rect {
    let [llx, _lly, _urx, ury] = media_box;
    Rect::new(llx + rect.x, ury - rect.y - rect.height, rect.width, rect.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: Size = Size {
        width: 612.0,
        height: 792.0,
    };

    fn assert_close(a: Rect, b: Rect) {
        let eps = 1e-9;
        assert!(
            (a.x - b.x).abs() < eps
                && (a.y - b.y).abs() < eps
                && (a.width - b.width).abs() < eps
                && (a.height - b.height).abs() < eps,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_unrotated_is_identity() {
        let rect = Rect::new(100.0, 200.0, 150.0, 20.0);
        assert_eq!(to_internal(rect, 0, LETTER), rect);
    }

    #[test]
    fn test_rotated_90() {
        let rect = Rect::new(100.0, 200.0, 150.0, 20.0);
        assert_close(to_internal(rect, 90, LETTER), Rect::new(572.0, 100.0, 20.0, 150.0));
    }

    #[test]
    fn test_rotated_180() {
        let rect = Rect::new(100.0, 200.0, 150.0, 20.0);
        assert_close(
            to_internal(rect, 180, LETTER),
            Rect::new(612.0 - 100.0 - 150.0, 792.0 - 200.0 - 20.0, 150.0, 20.0),
        );
    }

    #[test]
    fn test_rotated_270() {
        let rect = Rect::new(100.0, 200.0, 150.0, 20.0);
        assert_close(
            to_internal(rect, 270, LETTER),
            Rect::new(612.0 - 200.0 - 20.0, 100.0, 20.0, 150.0),
        );
    }

    #[test]
    fn test_unknown_rotation_is_identity() {
        let rect = Rect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(to_internal(rect, 45, LETTER), rect);
        assert_eq!(to_internal(rect, -90, LETTER), rect);
        assert_eq!(to_displayed(rect, 45, LETTER), rect);
    }

    #[test]
    fn test_round_trip_all_rotations() {
        let rects = [
            Rect::new(100.0, 200.0, 150.0, 20.0),
            Rect::new(0.0, 0.0, 612.0, 10.0),
            Rect::new(33.3, 71.25, 0.5, 400.0),
        ];
        for degrees in [0, 90, 180, 270] {
            for rect in rects {
                let back = to_displayed(to_internal(rect, degrees, LETTER), degrees, LETTER);
                assert_close(back, rect);
            }
        }
    }

    #[test]
    fn test_user_space_flips_y() {
        let rect = Rect::new(100.0, 200.0, 150.0, 20.0);
        let user = internal_to_user_space(rect, [0.0, 0.0, 612.0, 792.0]);
        assert_close(user, Rect::new(100.0, 572.0, 150.0, 20.0));

        let offset = internal_to_user_space(rect, [10.0, 20.0, 622.0, 812.0]);
        assert_close(offset, Rect::new(110.0, 592.0, 150.0, 20.0));
    }

    #[test]
    fn test_rotation_helpers() {
        assert!(Rotation::Cw90.swaps_axes());
        assert!(!Rotation::Cw180.swaps_axes());
        assert_eq!(Rotation::from_degrees(270).map(|r| r.degrees()), Some(270));
        assert_eq!(Rotation::from_degrees(30), None);
    }
}
