//! Level limits (Annex A)

use super::headers::Sps;

/// MaxDpbSize upper bound for every level
pub const MAX_DPB_SIZE: u32 = 16;

/// maxDpbPicBuf (A.4.2)
const MAX_DPB_PIC_BUF: u32 = 6;

/// MaxLumaPs (Table A.8), keyed by general_level_idc
const LEVEL_LIMITS: &[(u8, u32)] = &[
    (30, 36_864),
    (60, 122_880),
    (63, 245_760),
    (90, 552_960),
    (93, 983_040),
    (120, 2_228_224),
    (123, 2_228_224),
    (150, 8_912_896),
    (153, 8_912_896),
    (156, 8_912_896),
    (180, 35_651_584),
    (183, 35_651_584),
    (186, 35_651_584),
];

/// MaxLumaPs for a general_level_idc (level × 30), None for unknown levels
pub fn max_luma_ps(level_idc: u8) -> Option<u32> {
    LEVEL_LIMITS
        .iter()
        .find(|(idc, _)| *idc == level_idc)
        .map(|(_, max_luma_ps)| *max_luma_ps)
}

/// MaxDpbSize for the picture size and level of an SPS (A-2)
///
/// Unknown levels, level 0 included, fall back to [`MAX_DPB_SIZE`].
pub fn max_dpb_size(sps: &Sps) -> u32 {
    let level_idc = sps.profile_tier_level.general_level_idc;
    let max_luma_ps = match max_luma_ps(level_idc) {
        Some(max_luma_ps) => max_luma_ps as u64,
        None => {
            tracing::debug!(level_idc, "unknown level, assuming the largest DPB");
            return MAX_DPB_SIZE;
        }
    };

    let pic_size =
        sps.pic_width_in_luma_samples as u64 * sps.pic_height_in_luma_samples as u64;

    let size = if pic_size <= max_luma_ps >> 2 {
        MAX_DPB_PIC_BUF * 4
    } else if pic_size <= max_luma_ps >> 1 {
        MAX_DPB_PIC_BUF * 2
    } else if pic_size <= (3 * max_luma_ps) >> 2 {
        MAX_DPB_PIC_BUF * 4 / 3
    } else {
        MAX_DPB_PIC_BUF
    };

    size.min(MAX_DPB_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sps(width: u32, height: u32, level_idc: u8) -> Sps {
        let mut sps = Sps {
            pic_width_in_luma_samples: width,
            pic_height_in_luma_samples: height,
            ..Default::default()
        };
        sps.profile_tier_level.general_level_idc = level_idc;
        sps
    }

    #[test]
    fn test_max_luma_ps() {
        assert_eq!(max_luma_ps(30), Some(36_864));
        assert_eq!(max_luma_ps(93), Some(983_040));
        assert_eq!(max_luma_ps(186), Some(35_651_584));
        assert_eq!(max_luma_ps(0), None);
        assert_eq!(max_luma_ps(91), None);
    }

    #[test]
    fn test_full_size_picture() {
        // 1920x1080 at level 4.1 exceeds 3/4 of MaxLumaPs
        assert_eq!(max_dpb_size(&sps(1920, 1080, 123)), 6);
    }

    #[test]
    fn test_multipliers() {
        // level 3.1, MaxLumaPs 983040
        assert_eq!(max_dpb_size(&sps(256, 256, 93)), 16); // 24 clamped
        assert_eq!(max_dpb_size(&sps(640, 480, 93)), 12); // <= 1/2
        assert_eq!(max_dpb_size(&sps(960, 720, 93)), 8); // <= 3/4
        assert_eq!(max_dpb_size(&sps(1280, 720, 93)), 6);
    }

    #[test]
    fn test_unknown_level() {
        assert_eq!(max_dpb_size(&sps(1920, 1080, 0)), 16);
        assert_eq!(max_dpb_size(&sps(1920, 1080, 255)), 16);
    }
}
