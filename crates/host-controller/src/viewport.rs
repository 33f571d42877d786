//! Host viewport ↔ surface document coordinates.
//!
//! The surface sits at `origin` inside a canvas that is panned and zoomed as
//! a whole, so one affine `translate(pan) · scale(zoom) · translate(origin)`
//! carries surface pixels to host pixels. Both directions go through it.

use inspector_proto::HighlightBox;
use kurbo::{Affine, Point, Rect, Size, Vec2};

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 3.0;

/// Where the surface is rendered, in canvas pixels before pan and zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    pub origin: Point,
    pub size: Size,
}

impl SurfaceGeometry {
    pub fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    fn local_bounds(&self) -> Rect {
        Rect::from_origin_size(Point::ZERO, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasView {
    pub pan: Vec2,
    pub zoom: f64,
}

impl Default for CanvasView {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl CanvasView {
    pub fn new(pan: Vec2, zoom: f64) -> Self {
        Self { pan, zoom }.clamped()
    }

    pub fn clamped(self) -> Self {
        let zoom = if self.zoom.is_finite() {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        let pan = if self.pan.is_finite() { self.pan } else { Vec2::ZERO };
        Self { pan, zoom }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMapper {
    geometry: SurfaceGeometry,
    view: CanvasView,
}

impl ViewportMapper {
    pub fn new(geometry: SurfaceGeometry, view: CanvasView) -> Self {
        Self {
            geometry,
            view: view.clamped(),
        }
    }

    pub fn surface_to_host(&self) -> Affine {
        Affine::translate(self.view.pan)
            * Affine::scale(self.view.zoom)
            * Affine::translate(self.geometry.origin.to_vec2())
    }

    /// Host pointer → surface document point. `None` when the pointer is
    /// not over the rendered surface.
    pub fn pointer_to_local(&self, pointer: Point) -> Option<Point> {
        if !pointer.is_finite() {
            return None;
        }
        let local = self.surface_to_host().inverse() * pointer;
        let size = self.geometry.size;
        let inside = local.x >= 0.0 && local.y >= 0.0 && local.x < size.width && local.y < size.height;
        inside.then_some(local)
    }

    /// Agent-reported box → host viewport rectangle. `None` for non-finite
    /// boxes and boxes entirely off the surface.
    pub fn rect_to_host(&self, highlight: HighlightBox) -> Option<Rect> {
        let HighlightBox {
            top,
            left,
            width,
            height,
        } = highlight;
        let finite = [top, left, width, height].iter().all(|v| v.is_finite());
        if !finite || width < 0.0 || height < 0.0 {
            return None;
        }
        let rect = Rect::new(left, top, left + width, top + height);
        let bounds = self.geometry.local_bounds();
        let overlaps = rect.x0 <= bounds.x1 && rect.y0 <= bounds.y1 && rect.x1 >= bounds.x0 && rect.y1 >= bounds.y0;
        overlaps.then(|| self.surface_to_host().transform_rect_bbox(rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_timeout::timeout;

    fn close(a: Point, b: Point) -> bool {
        (a - b).hypot() < 1e-9
    }

    fn geometry() -> SurfaceGeometry {
        SurfaceGeometry::new(Point::new(40.0, 60.0), Size::new(800.0, 600.0))
    }

    #[timeout(5)]
    fn unzoomed_mapping_subtracts_surface_offset() {
        let mapper = ViewportMapper::new(geometry(), CanvasView::default());
        let local = mapper.pointer_to_local(Point::new(190.0, 310.0)).unwrap();
        assert!(close(local, Point::new(150.0, 250.0)));
        let rect = mapper
            .rect_to_host(HighlightBox {
                top: 200.0,
                left: 100.0,
                width: 100.0,
                height: 100.0,
            })
            .unwrap();
        assert_eq!(rect, Rect::new(140.0, 260.0, 240.0, 360.0));
    }

    #[timeout(5)]
    fn zoom_and_pan_compose_in_one_transform() {
        let view = CanvasView::new(Vec2::new(-20.0, 10.0), 2.0);
        let mapper = ViewportMapper::new(geometry(), view);
        // 2 * (40 + 150) - 20, 2 * (60 + 250) + 10
        let pointer = Point::new(360.0, 630.0);
        let local = mapper.pointer_to_local(pointer).unwrap();
        assert!(close(local, Point::new(150.0, 250.0)));

        let rect = mapper
            .rect_to_host(HighlightBox {
                top: 250.0,
                left: 150.0,
                width: 10.0,
                height: 10.0,
            })
            .unwrap();
        assert!(close(rect.origin(), pointer));
        assert_eq!(rect.size(), Size::new(20.0, 20.0));
    }

    #[timeout(5)]
    fn pointers_off_the_surface_are_rejected() {
        let mapper = ViewportMapper::new(geometry(), CanvasView::new(Vec2::ZERO, 0.5));
        assert!(mapper.pointer_to_local(Point::new(10.0, 10.0)).is_none());
        assert!(mapper.pointer_to_local(Point::new(20.0 + 400.0, 40.0)).is_none());
        assert!(mapper.pointer_to_local(Point::new(f64::NAN, 40.0)).is_none());
        assert!(mapper.pointer_to_local(Point::new(20.0, 30.0)).is_some());
    }

    #[timeout(5)]
    fn degenerate_boxes_are_rejected() {
        let mapper = ViewportMapper::new(geometry(), CanvasView::default());
        let off = HighlightBox {
            top: 900.0,
            left: 0.0,
            width: 10.0,
            height: 10.0,
        };
        assert!(mapper.rect_to_host(off).is_none());
        let nan = HighlightBox {
            top: f64::NAN,
            left: 0.0,
            width: 10.0,
            height: 10.0,
        };
        assert!(mapper.rect_to_host(nan).is_none());
    }

    #[timeout(5)]
    fn zoom_is_clamped() {
        assert_eq!(CanvasView::new(Vec2::ZERO, 10.0).zoom, MAX_ZOOM);
        assert_eq!(CanvasView::new(Vec2::ZERO, 0.0).zoom, MIN_ZOOM);
        assert_eq!(CanvasView::new(Vec2::ZERO, f64::INFINITY).zoom, 1.0);
    }
}
