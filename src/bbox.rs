use serde::{Deserialize, Serialize};
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

use nalgebra as na;

pub trait BBoxFormat: std::fmt::Debug {}

/// Left-top-width-height format, contains left top corner and width-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BBox<F: BBoxFormat + Serialize + Deserialize<'static> + PartialEq>(
    [f32; 4],
    PhantomData<F>,
);

impl<F: BBoxFormat + Serialize + Deserialize<'static> + PartialEq> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn ltwh(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], Default::default())
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], Default::default())
    }

    #[inline]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        self.into()
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    /// Bottom-center pixel of the box, the ground-contact proxy of a player.
    #[inline]
    pub fn foot_point(&self) -> na::Point2<f32> {
        na::Point2::new(
            ((self.left() + self.right()) / 2.0).round(),
            self.bottom().round(),
        )
    }

    /// Upper half of the box in whole pixels, where the jersey usually is.
    pub fn jersey_region(&self) -> BBox<Ltwh> {
        let left = self.left().trunc();
        let top = self.top().trunc();
        let right = self.right().trunc();
        let middle = ((top + self.bottom().trunc()) / 2.0).trunc();

        BBox::ltwh(left, top, right - left, middle - top)
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        Self(
            [v.0[0], v.0[1], v.0[2] + v.0[0], v.0[3] + v.0[1]],
            Default::default(),
        )
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Ltwh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        Self(
            [v.0[0], v.0[1], v.0[2] - v.0[0], v.0[3] - v.0[1]],
            Default::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foot_point_is_bottom_center() {
        let bbox = BBox::ltrb(2.0, 0.0, 12.0, 20.0);
        assert_eq!(bbox.foot_point(), na::Point2::new(7.0, 20.0));
    }

    #[test]
    fn foot_point_rounds_to_nearest_pixel() {
        let bbox = BBox::ltrb(10.0, 5.0, 13.0, 40.6);
        assert_eq!(bbox.foot_point(), na::Point2::new(12.0, 41.0));
    }

    #[test]
    fn jersey_region_is_upper_half() {
        let region = BBox::ltrb(10.0, 20.0, 30.0, 60.0).jersey_region();
        assert_eq!(region.as_slice(), &[10.0, 20.0, 20.0, 20.0]);
        assert!(!region.is_empty());
    }

    #[test]
    fn ltrb_ltwh_conversion() {
        let bbox = BBox::ltrb(1.0, 2.0, 4.0, 8.0);
        let ltwh = bbox.as_ltwh();
        assert_eq!(ltwh.as_slice(), &[1.0, 2.0, 3.0, 6.0]);
        assert_eq!(ltwh.as_ltrb(), bbox);
    }
}
