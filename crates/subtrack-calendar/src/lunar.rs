//! Solar ⇄ lunar conversion backed by a per-year encoding table.
//!
//! Each table entry packs one lunar year:
//! ```text
//! bits 0..=3    leap month (0 = none)
//! bits 4..=15   month 12 .. month 1 size (1 = 30 days, 0 = 29 days)
//! bit  16       leap month size (1 = 30 days)
//! ```
//! The table starts at lunar 1900-01-01, which fell on solar 1900-01-31.

use std::sync::LazyLock;

use chrono::{Datelike, Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use subtrack_core::ConversionError;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

#[rustfmt::skip]
const LUNAR_INFO: [u32; 201] = [
    0x04bd8, 0x04ae0, 0x0a570, 0x054d5, 0x0d260, 0x0d950, 0x16554, 0x056a0, 0x09ad0, 0x055d2, // 1900-1909
    0x04ae0, 0x0a5b6, 0x0a4d0, 0x0d250, 0x1d255, 0x0b540, 0x0d6a0, 0x0ada2, 0x095b0, 0x14977, // 1910-1919
    0x04970, 0x0a4b0, 0x0b4b5, 0x06a50, 0x06d40, 0x1ab54, 0x02b60, 0x09570, 0x052f2, 0x04970, // 1920-1929
    0x06566, 0x0d4a0, 0x0ea50, 0x16a95, 0x05ad0, 0x02b60, 0x186e3, 0x092e0, 0x1c8d7, 0x0c950, // 1930-1939
    0x0d4a0, 0x1d8a6, 0x0b550, 0x056a0, 0x1a5b4, 0x025d0, 0x092d0, 0x0d2b2, 0x0a950, 0x0b557, // 1940-1949
    0x06ca0, 0x0b550, 0x15355, 0x04da0, 0x0a5b0, 0x14573, 0x052b0, 0x0a9a8, 0x0e950, 0x06aa0, // 1950-1959
    0x0aea6, 0x0ab50, 0x04b60, 0x0aae4, 0x0a570, 0x05260, 0x0f263, 0x0d950, 0x05b57, 0x056a0, // 1960-1969
    0x096d0, 0x04dd5, 0x04ad0, 0x0a4d0, 0x0d4d4, 0x0d250, 0x0d558, 0x0b540, 0x0b6a0, 0x195a6, // 1970-1979
    0x095b0, 0x049b0, 0x0a974, 0x0a4b0, 0x0b27a, 0x06a50, 0x06d40, 0x0af46, 0x0ab60, 0x09570, // 1980-1989
    0x04af5, 0x04970, 0x064b0, 0x074a3, 0x0ea50, 0x06b58, 0x05ac0, 0x0ab60, 0x096d5, 0x092e0, // 1990-1999
    0x0c960, 0x0d954, 0x0d4a0, 0x0da50, 0x07552, 0x056a0, 0x0abb7, 0x025d0, 0x092d0, 0x0cab5, // 2000-2009
    0x0a950, 0x0b4a0, 0x0baa4, 0x0ad50, 0x055d9, 0x04ba0, 0x0a5b0, 0x15176, 0x052b0, 0x0a930, // 2010-2019
    0x07954, 0x06aa0, 0x0ad50, 0x05b52, 0x04b60, 0x0a6e6, 0x0a4e0, 0x0d260, 0x0ea65, 0x0d530, // 2020-2029
    0x05aa0, 0x076a3, 0x096d0, 0x04afb, 0x04ad0, 0x0a4d0, 0x1d0b6, 0x0d250, 0x0d520, 0x0dd45, // 2030-2039
    0x0b5a0, 0x056d0, 0x055b2, 0x049b0, 0x0a577, 0x0a4b0, 0x0aa50, 0x1b255, 0x06d20, 0x0ada0, // 2040-2049
    0x14b63, 0x09370, 0x049f8, 0x04970, 0x064b0, 0x168a6, 0x0ea50, 0x06b20, 0x1a6c4, 0x0aae0, // 2050-2059
    0x092e0, 0x0d2e3, 0x0c960, 0x0d557, 0x0d4a0, 0x0da50, 0x05d55, 0x056a0, 0x0a6d0, 0x055d4, // 2060-2069
    0x052d0, 0x0a9b8, 0x0a950, 0x0b4a0, 0x0b6a6, 0x0ad50, 0x055a0, 0x0aba4, 0x0a5b0, 0x052b0, // 2070-2079
    0x0b273, 0x06930, 0x07337, 0x06aa0, 0x0ad50, 0x14b55, 0x04b60, 0x0a570, 0x054e4, 0x0d160, // 2080-2089
    0x0e968, 0x0d520, 0x0daa0, 0x16aa6, 0x056d0, 0x04ae0, 0x0a9d4, 0x0a2d0, 0x0d150, 0x0f252, // 2090-2099
    0x0d520, // 2100
];

const CN_DIGITS: [&str; 10] = ["〇", "一", "二", "三", "四", "五", "六", "七", "八", "九"];
const CN_MONTHS: [&str; 12] = ["正", "二", "三", "四", "五", "六", "七", "八", "九", "十", "冬", "腊"];
const CN_DAY_TENS: [&str; 4] = ["初", "十", "廿", "三"];
const HEAVENLY_STEMS: [&str; 10] = ["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸"];
const EARTHLY_BRANCHES: [&str; 12] =
    ["子", "丑", "寅", "卯", "辰", "巳", "午", "未", "申", "酉", "戌", "亥"];
const ZODIAC: [&str; 12] = ["鼠", "牛", "虎", "兔", "龙", "蛇", "马", "羊", "猴", "鸡", "狗", "猪"];

/// One decoded table row.
struct LunarYear {
    info: u32,
    /// Days from the epoch to this year's lunar New Year.
    offset: i64,
    /// Solar date of lunar month 1, day 1.
    new_year: NaiveDate,
    days: u32,
}

static EPOCH: LazyLock<NaiveDate> =
    LazyLock::new(|| NaiveDate::from_ymd_opt(1900, 1, 31).unwrap_or_default());

static TABLE: LazyLock<Vec<LunarYear>> = LazyLock::new(|| {
    let epoch = *EPOCH;
    let mut offset = 0i64;
    LUNAR_INFO
        .iter()
        .map(|&info| {
            let days = year_days_of(info);
            let new_year = epoch
                .checked_add_days(Days::new(offset as u64))
                .unwrap_or(epoch);
            let row = LunarYear { info, offset, new_year, days };
            offset += days as i64;
            row
        })
        .collect()
});

/// A date in the Chinese lunar calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LunarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// `month` is the intercalary month of `year`.
    pub is_leap: bool,
}

impl LunarDate {
    pub fn new(year: i32, month: u32, day: u32, is_leap: bool) -> Self {
        Self { year, month, day, is_leap }
    }

    /// Chinese rendering, e.g. `二〇二三年闰二月初一`.
    pub fn to_chinese(&self) -> String {
        let year: String = self
            .year
            .to_string()
            .chars()
            .filter_map(|c| c.to_digit(10))
            .map(|d| CN_DIGITS[d as usize])
            .collect();
        format!("{year}年{}{}", month_name(self.month, self.is_leap), day_name(self.day))
    }
}

impl std::fmt::Display for LunarDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_chinese())
    }
}

/// Chinese month name such as `正月` or `闰二月`.
pub fn month_name(month: u32, is_leap: bool) -> String {
    let name = CN_MONTHS
        .get(month.wrapping_sub(1) as usize)
        .copied()
        .unwrap_or("?");
    if is_leap { format!("闰{name}月") } else { format!("{name}月") }
}

/// Chinese day name such as `初一`, `二十` or `廿九`.
pub fn day_name(day: u32) -> String {
    match day {
        10 => "初十".into(),
        20 => "二十".into(),
        30 => "三十".into(),
        1..=29 => format!(
            "{}{}",
            CN_DAY_TENS[(day / 10) as usize],
            CN_DIGITS[(day % 10) as usize]
        ),
        _ => day.to_string(),
    }
}

/// Sexagenary (干支) name of a lunar year, e.g. `甲辰` for 2024.
pub fn gan_zhi_year(year: i32) -> String {
    let n = (year - 4).rem_euclid(60) as usize;
    format!("{}{}", HEAVENLY_STEMS[n % 10], EARTHLY_BRANCHES[n % 12])
}

/// Zodiac animal of a lunar year, e.g. `龙` for 2024.
pub fn zodiac(year: i32) -> &'static str {
    ZODIAC[(year - 4).rem_euclid(12) as usize]
}

fn row(year: i32) -> Option<&'static LunarYear> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    TABLE.get((year - MIN_YEAR) as usize)
}

fn leap_month_of(info: u32) -> u32 {
    info & 0xf
}

fn leap_days_of(info: u32) -> u32 {
    match leap_month_of(info) {
        0 => 0,
        _ if info & 0x10000 != 0 => 30,
        _ => 29,
    }
}

fn month_days_of(info: u32, month: u32) -> u32 {
    if info & (0x10000 >> month) != 0 { 30 } else { 29 }
}

fn year_days_of(info: u32) -> u32 {
    let big_months = (info & 0xfff0).count_ones();
    348 + big_months + leap_days_of(info)
}

/// Total days in lunar `year`, or 0 outside 1900–2100.
pub fn lunar_year_days(year: i32) -> u32 {
    row(year).map(|r| r.days).unwrap_or(0)
}

/// Leap month of `year` (1–12), or 0 when the year has none.
pub fn leap_month(year: i32) -> u32 {
    row(year).map(|r| leap_month_of(r.info)).unwrap_or(0)
}

/// Length of the leap month of `year`, or 0 when the year has none.
pub fn leap_days(year: i32) -> u32 {
    row(year).map(|r| leap_days_of(r.info)).unwrap_or(0)
}

/// Length (29 or 30) of ordinary `month` of `year`; 0 for invalid input.
pub fn month_days(year: i32, month: u32) -> u32 {
    match row(year) {
        Some(r) if (1..=12).contains(&month) => month_days_of(r.info, month),
        _ => 0,
    }
}

/// Solar date of lunar New Year for `year`.
pub fn new_year(year: i32) -> Option<NaiveDate> {
    row(year).map(|r| r.new_year)
}

/// Convert a solar (Gregorian) date to the lunar calendar.
pub fn solar_to_lunar(year: i32, month: u32, day: u32) -> Result<LunarDate, ConversionError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ConversionError::OutOfRange { year });
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(ConversionError::InvalidSolarDate { year, month, day })?;
    solar_date_to_lunar(date)
}

/// Convert a [`NaiveDate`] to the lunar calendar.
pub fn solar_date_to_lunar(date: NaiveDate) -> Result<LunarDate, ConversionError> {
    let year = date.year();
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ConversionError::OutOfRange { year });
    }
    let offset = (date - *EPOCH).num_days();
    if offset < 0 {
        return Err(ConversionError::OutOfRange { year });
    }

    let idx = TABLE.partition_point(|r| r.offset <= offset);
    let Some(lunar_year) = idx.checked_sub(1).and_then(|i| TABLE.get(i)) else {
        return Err(ConversionError::OutOfRange { year });
    };
    let mut remaining = (offset - lunar_year.offset) as u32;
    if remaining >= lunar_year.days {
        return Err(ConversionError::OutOfRange { year });
    }

    let ly = MIN_YEAR + (idx as i32 - 1);
    let leap = leap_month_of(lunar_year.info);
    for month in 1..=12 {
        let days = month_days_of(lunar_year.info, month);
        if remaining < days {
            return Ok(LunarDate::new(ly, month, remaining + 1, false));
        }
        remaining -= days;
        if leap == month {
            let days = leap_days_of(lunar_year.info);
            if remaining < days {
                return Ok(LunarDate::new(ly, month, remaining + 1, true));
            }
            remaining -= days;
        }
    }
    Err(ConversionError::InvalidSolarDate { year, month: date.month(), day: date.day() })
}

/// Convert a lunar date back to the solar calendar.
pub fn lunar_to_solar(lunar: &LunarDate) -> Result<NaiveDate, ConversionError> {
    let LunarDate { year, month, day, is_leap } = *lunar;
    let r = row(year).ok_or(ConversionError::OutOfRange { year })?;
    if !(1..=12).contains(&month) || day == 0 {
        return Err(ConversionError::InvalidLunarDate { year, month, day });
    }
    let leap = leap_month_of(r.info);
    if is_leap && leap != month {
        return Err(ConversionError::NoSuchLeapMonth { year, month });
    }
    let max = if is_leap { leap_days_of(r.info) } else { month_days_of(r.info, month) };
    if day > max {
        return Err(ConversionError::DayOverflow { year, month, day, max });
    }

    let mut offset = r.offset;
    for m in 1..month {
        offset += month_days_of(r.info, m) as i64;
    }
    if leap != 0 && leap < month {
        offset += leap_days_of(r.info) as i64;
    }
    if is_leap {
        // The ordinary month precedes its leap twin.
        offset += month_days_of(r.info, month) as i64;
    }
    offset += (day - 1) as i64;

    EPOCH
        .checked_add_days(Days::new(offset as u64))
        .ok_or(ConversionError::InvalidLunarDate { year, month, day })
}

/// Signed number of days from `today` to the solar date of `lunar`
/// (negative when it lies in the past).
pub fn days_between(today: NaiveDate, lunar: &LunarDate) -> Result<i64, ConversionError> {
    let solar = lunar_to_solar(lunar)?;
    Ok((solar - today).num_days())
}

/// [`days_between`] measured from the local calendar date.
pub fn days_from_today(lunar: &LunarDate) -> Result<i64, ConversionError> {
    days_between(Local::now().date_naive(), lunar)
}
