//! 波形图块缓存模块
//!
//! 按容器和缩放级别缓存光栅化的峰值图像。在容差窗口内（默认 ×2）继续复用同一图块，
//! 超出后由调用方重新生成。图块只会通过 [`WaveformTileCache::invalidate`] 和
//! [`WaveformTileCache::invalidate_all`] 失效。

use crate::structure::ContainerId;
use egui::{Color32, ColorImage};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Widest tile the cache rasterizes; wider containers are squeezed into it
pub const MAX_TILE_WIDTH: usize = 8192;
pub const MAX_TILE_HEIGHT: usize = 1024;

/// Zoom bucket key: pixels-per-bar in thousandths
fn zoom_key(pixels_per_bar: f32) -> u64 {
    (pixels_per_bar as f64 * 1000.0).round() as u64
}

#[derive(Clone, Debug)]
pub struct WaveformTile {
    pub container_id: ContainerId,
    pub image: Arc<ColorImage>,
    /// Zoom the tile was generated at
    pub pixels_per_bar: f32,
    /// Audible container length the tile was generated for
    pub length_bars: f64,
}

impl WaveformTile {
    /// True when the tile was rasterized for this container length and row height
    pub fn fits(&self, length_bars: f64, height: f32) -> bool {
        self.length_bars.to_bits() == length_bars.to_bits() && self.height() == tile_height(height)
    }

    pub fn width(&self) -> usize {
        self.image.size[0]
    }

    pub fn height(&self) -> usize {
        self.image.size[1]
    }
}

pub struct WaveformTileCache {
    tiles: HashMap<ContainerId, BTreeMap<u64, WaveformTile>>,
    zoom_tolerance: f32,
}

impl Default for WaveformTileCache {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl WaveformTileCache {
    pub fn new(zoom_tolerance: f32) -> Self {
        Self {
            tiles: HashMap::new(),
            zoom_tolerance: zoom_tolerance.max(1.0),
        }
    }

    pub fn zoom_tolerance(&self) -> f32 {
        self.zoom_tolerance
    }

    pub fn set_zoom_tolerance(&mut self, zoom_tolerance: f32) {
        self.zoom_tolerance = zoom_tolerance.max(1.0);
    }

    /// 按给定缩放级别把容器的 `peaks` 光栅化并缓存
    ///
    /// 没有峰值或几何尺寸无效时返回 `None`。
    pub fn generate_tile(
        &mut self,
        container_id: ContainerId,
        peaks: &[f32],
        container_length_bars: f64,
        pixels_per_bar: f32,
        height: f32,
        color: Color32,
    ) -> Option<&WaveformTile> {
        if peaks.is_empty() {
            return None;
        }
        if !(pixels_per_bar.is_finite() && pixels_per_bar > 0.0)
            || !(container_length_bars.is_finite() && container_length_bars > 0.0)
            || !(height.is_finite() && height > 0.0)
        {
            log::warn!(
                "Skipping waveform tile for {:?}: ppb={}, length={}, height={}",
                container_id,
                pixels_per_bar,
                container_length_bars,
                height
            );
            return None;
        }

        let width = ((container_length_bars * pixels_per_bar as f64).ceil() as usize).clamp(1, MAX_TILE_WIDTH);
        let height = tile_height(height);
        let image = rasterize_peaks(peaks, width, height, color);

        log::debug!(
            "Generated waveform tile for {:?}: {}x{} px at {} ppb from {} peaks",
            container_id,
            width,
            height,
            pixels_per_bar,
            peaks.len()
        );

        let key = zoom_key(pixels_per_bar);
        let buckets = self.tiles.entry(container_id).or_default();
        buckets.insert(
            key,
            WaveformTile {
                container_id,
                image: Arc::new(image),
                pixels_per_bar,
                length_bars: container_length_bars,
            },
        );
        buckets.get(&key)
    }

    /// 在容差窗口内查找缩放级别最接近的图块
    pub fn tile(&self, container_id: ContainerId, pixels_per_bar: f32) -> Option<&WaveformTile> {
        if !(pixels_per_bar.is_finite() && pixels_per_bar > 0.0) {
            return None;
        }
        let low = pixels_per_bar / self.zoom_tolerance;
        let high = pixels_per_bar * self.zoom_tolerance;
        let distance = |tile: &WaveformTile| (tile.pixels_per_bar / pixels_per_bar).ln().abs();

        self.tiles
            .get(&container_id)?
            .values()
            .filter(|tile| tile.pixels_per_bar >= low && tile.pixels_per_bar <= high)
            .min_by(|a, b| distance(a).total_cmp(&distance(b)))
    }

    /// 获取容差内的缓存图块，没有时生成新图块
    ///
    /// 按其他容器长度或行高生成的图块会被替换，不会被拉伸。
    pub fn tile_or_generate(
        &mut self,
        container_id: ContainerId,
        peaks: &[f32],
        container_length_bars: f64,
        pixels_per_bar: f32,
        height: f32,
        color: Color32,
    ) -> Option<&WaveformTile> {
        let fits = self
            .tile(container_id, pixels_per_bar)
            .is_some_and(|tile| tile.fits(container_length_bars, height));
        if fits {
            return self.tile(container_id, pixels_per_bar);
        }
        if let Some(buckets) = self.tiles.get_mut(&container_id) {
            buckets.retain(|_, tile| tile.fits(container_length_bars, height));
        }
        self.generate_tile(container_id, peaks, container_length_bars, pixels_per_bar, height, color)
    }

    /// 删除一个容器所有缩放级别的图块
    pub fn invalidate(&mut self, container_id: ContainerId) {
        if let Some(buckets) = self.tiles.remove(&container_id) {
            log::debug!("Invalidated {} waveform tiles for {:?}", buckets.len(), container_id);
        }
    }

    pub fn invalidate_all(&mut self) {
        log::debug!("Invalidated all waveform tiles ({} total)", self.len());
        self.tiles.clear();
    }

    /// Generation zooms cached for a container, ascending
    pub fn cached_zoom_levels(&self, container_id: ContainerId) -> Vec<f32> {
        self.tiles
            .get(&container_id)
            .map(|buckets| buckets.values().map(|tile| tile.pixels_per_bar).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tiles.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

fn tile_height(height: f32) -> usize {
    (height.ceil() as usize).clamp(1, MAX_TILE_HEIGHT)
}

/// Draws one mirrored column per pixel, each the loudest peak of its bucket
fn rasterize_peaks(peaks: &[f32], width: usize, height: usize, color: Color32) -> ColorImage {
    let mut image = ColorImage::new([width, height], Color32::TRANSPARENT);
    let center = height as f32 / 2.0;

    for col in 0..width {
        let start = col * peaks.len() / width;
        let end = ((col + 1) * peaks.len() / width).clamp(start + 1, peaks.len());
        let amplitude = peaks[start..end]
            .iter()
            .fold(0.0f32, |acc, p| acc.max(p.abs()))
            .min(1.0);

        let half = amplitude * center;
        let top = ((center - half).floor().max(0.0) as usize).min(height - 1);
        let bottom = ((center + half).ceil() as usize).clamp(top + 1, height);
        for y in top..bottom {
            image[(col, y)] = color;
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks() -> Vec<f32> {
        (0..256).map(|i| (i as f32 / 256.0).sin().abs()).collect()
    }

    #[test]
    fn empty_peaks_produce_no_tile() {
        let mut cache = WaveformTileCache::default();
        let id = ContainerId::next();
        assert!(cache.generate_tile(id, &[], 4.0, 120.0, 60.0, Color32::WHITE).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn tile_is_sized_to_the_container() {
        let mut cache = WaveformTileCache::default();
        let id = ContainerId::next();
        let tile = cache
            .generate_tile(id, &peaks(), 4.0, 120.0, 59.5, Color32::WHITE)
            .unwrap();
        assert_eq!(tile.width(), 480);
        assert_eq!(tile.height(), 60);
        assert_eq!(tile.pixels_per_bar, 120.0);
    }

    #[test]
    fn lookup_respects_zoom_tolerance() {
        let mut cache = WaveformTileCache::default();
        let id = ContainerId::next();
        cache.generate_tile(id, &peaks(), 4.0, 120.0, 60.0, Color32::WHITE);

        assert!(cache.tile(id, 150.0).is_some());
        assert!(cache.tile(id, 60.0).is_some());
        assert!(cache.tile(id, 240.0).is_some());
        assert!(cache.tile(id, 500.0).is_none());
        assert!(cache.tile(id, 59.0).is_none());
        assert!(cache.tile(ContainerId(u64::MAX), 120.0).is_none());
    }

    #[test]
    fn lookup_prefers_closest_bucket() {
        let mut cache = WaveformTileCache::default();
        let id = ContainerId::next();
        cache.generate_tile(id, &peaks(), 2.0, 100.0, 40.0, Color32::WHITE);
        cache.generate_tile(id, &peaks(), 2.0, 180.0, 40.0, Color32::WHITE);

        assert_eq!(cache.tile(id, 110.0).map(|t| t.pixels_per_bar), Some(100.0));
        assert_eq!(cache.tile(id, 170.0).map(|t| t.pixels_per_bar), Some(180.0));
        assert_eq!(cache.cached_zoom_levels(id), vec![100.0, 180.0]);
    }

    #[test]
    fn invalidate_drops_only_that_container() {
        let mut cache = WaveformTileCache::default();
        let a = ContainerId::next();
        let b = ContainerId::next();
        cache.generate_tile(a, &peaks(), 2.0, 100.0, 40.0, Color32::WHITE);
        cache.generate_tile(a, &peaks(), 2.0, 400.0, 40.0, Color32::WHITE);
        cache.generate_tile(b, &peaks(), 2.0, 100.0, 40.0, Color32::WHITE);
        assert_eq!(cache.len(), 3);

        cache.invalidate(a);
        assert!(cache.cached_zoom_levels(a).is_empty());
        assert_eq!(cache.cached_zoom_levels(b), vec![100.0]);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn tile_or_generate_reuses_within_tolerance() {
        let mut cache = WaveformTileCache::default();
        let id = ContainerId::next();
        cache.tile_or_generate(id, &peaks(), 2.0, 100.0, 40.0, Color32::WHITE);
        cache.tile_or_generate(id, &peaks(), 2.0, 130.0, 40.0, Color32::WHITE);
        assert_eq!(cache.cached_zoom_levels(id), vec![100.0]);

        cache.tile_or_generate(id, &peaks(), 2.0, 450.0, 40.0, Color32::WHITE);
        assert_eq!(cache.cached_zoom_levels(id), vec![100.0, 450.0]);
    }

    #[test]
    fn tile_or_generate_replaces_tiles_of_another_length() {
        let mut cache = WaveformTileCache::default();
        let id = ContainerId::next();
        cache.tile_or_generate(id, &peaks(), 4.0, 120.0, 60.0, Color32::WHITE);
        cache.tile_or_generate(id, &peaks(), 4.0, 400.0, 60.0, Color32::WHITE);

        let tile = cache
            .tile_or_generate(id, &peaks(), 6.0, 120.0, 60.0, Color32::WHITE)
            .unwrap();
        assert_eq!(tile.width(), 720);
        assert_eq!(cache.cached_zoom_levels(id), vec![120.0]);

        let taller = cache
            .tile_or_generate(id, &peaks(), 6.0, 120.0, 90.0, Color32::WHITE)
            .unwrap();
        assert_eq!(taller.height(), 90);
    }

    #[test]
    fn loud_columns_fill_more_rows_than_quiet_ones() {
        let image = rasterize_peaks(&[0.1, 1.0], 2, 20, Color32::WHITE);
        let filled = |col: usize| (0..20).filter(|&y| image[(col, y)] == Color32::WHITE).count();
        assert!(filled(0) < filled(1));
        assert_eq!(filled(1), 20);
        assert!(filled(0) >= 1);
    }
}
