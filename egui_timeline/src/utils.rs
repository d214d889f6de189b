//! 工具函数模块
//!
//! 包含宿主界面使用的格式化函数，如小节位置格式化等。

use crate::structure::TimeSignature;

const SUBDIVISIONS_PER_BEAT: f64 = 4.0;
const EPSILON: f64 = 1e-9;

/// 将小节位置（从 1 开始）格式化为 "小节.拍.十六分音符" 格式
///
/// # 参数
///
/// * `bar` - 小节位置，小于 1 或非有限值按 1 处理
/// * `time_signature` - 拍号，决定每小节的拍数
///
/// # 返回
///
/// 格式化后的位置字符串，例如 "3.2.2"
///
/// # 示例
///
/// ```
/// use egui_timeline::structure::TimeSignature;
/// use egui_timeline::utils::format_bar_position;
///
/// assert_eq!(format_bar_position(1.0, TimeSignature::default()), "1.1.1");
/// assert_eq!(format_bar_position(3.3125, TimeSignature::default()), "3.2.2");
/// ```
pub fn format_bar_position(bar: f64, time_signature: TimeSignature) -> String {
    let bar = if bar.is_finite() { bar.max(1.0) } else { 1.0 };
    let whole = (bar + EPSILON).floor();
    let beat_position = ((bar - whole) * time_signature.beats()).max(0.0) + EPSILON;
    let beat = beat_position.floor();
    let sixteenth = ((beat_position - beat) * SUBDIVISIONS_PER_BEAT).floor();
    format!("{}.{}.{}", whole as u64, beat as u64 + 1, sixteenth as u64 + 1)
}

/// 将小节长度格式化为字符串，整小节时省略小数部分
///
/// # 参数
///
/// * `length_bars` - 长度（小节）
///
/// # 返回
///
/// 例如 "4 bars" 或 "0.25 bars"
///
/// # 示例
///
/// ```
/// use egui_timeline::utils::format_bar_length;
///
/// assert_eq!(format_bar_length(4.0), "4 bars");
/// ```
pub fn format_bar_length(length_bars: f64) -> String {
    if (length_bars - length_bars.round()).abs() < EPSILON {
        format!("{} bars", length_bars.round() as i64)
    } else {
        format!("{:.2} bars", length_bars)
    }
}
