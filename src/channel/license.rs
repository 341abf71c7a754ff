use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Licenses a channel node may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LicenseKind {
    #[serde(rename = "CC BY")]
    CcBy,
    #[serde(rename = "CC BY-SA")]
    CcBySa,
    #[serde(rename = "CC BY-ND")]
    CcByNd,
    #[serde(rename = "CC BY-NC")]
    CcByNc,
    #[serde(rename = "CC BY-NC-SA")]
    CcByNcSa,
    #[serde(rename = "CC BY-NC-ND")]
    CcByNcNd,
    #[serde(rename = "All Rights Reserved")]
    AllRightsReserved,
    #[serde(rename = "Public Domain")]
    PublicDomain,
    #[serde(rename = "Special Permissions")]
    SpecialPermissions,
}

impl LicenseKind {
    pub const ALL: [LicenseKind; 9] = [
        LicenseKind::CcBy,
        LicenseKind::CcBySa,
        LicenseKind::CcByNd,
        LicenseKind::CcByNc,
        LicenseKind::CcByNcSa,
        LicenseKind::CcByNcNd,
        LicenseKind::AllRightsReserved,
        LicenseKind::PublicDomain,
        LicenseKind::SpecialPermissions,
    ];

    /// Canonical code, e.g. `CC BY-SA`.
    pub fn code(self) -> &'static str {
        match self {
            LicenseKind::CcBy => "CC BY",
            LicenseKind::CcBySa => "CC BY-SA",
            LicenseKind::CcByNd => "CC BY-ND",
            LicenseKind::CcByNc => "CC BY-NC",
            LicenseKind::CcByNcSa => "CC BY-NC-SA",
            LicenseKind::CcByNcNd => "CC BY-NC-ND",
            LicenseKind::AllRightsReserved => "All Rights Reserved",
            LicenseKind::PublicDomain => "Public Domain",
            LicenseKind::SpecialPermissions => "Special Permissions",
        }
    }
}

impl fmt::Display for LicenseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Returned when a license code does not name a known license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLicense(pub String);

impl FromStr for LicenseKind {
    type Err = UnknownLicense;

    /// Matches codes case-insensitively, ignoring surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        LicenseKind::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownLicense(s.to_string()))
    }
}

/// A resolved license plus the party holding the rights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub kind: LicenseKind,
    pub copyright_holder: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalized_codes() {
        assert_eq!("CC BY-SA".parse::<LicenseKind>(), Ok(LicenseKind::CcBySa));
        assert_eq!("CC BY".parse::<LicenseKind>(), Ok(LicenseKind::CcBy));
        assert_eq!("CC BY-NC-ND".parse::<LicenseKind>(), Ok(LicenseKind::CcByNcNd));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("cc by-nc".parse::<LicenseKind>(), Ok(LicenseKind::CcByNc));
        assert_eq!("PUBLIC DOMAIN".parse::<LicenseKind>(), Ok(LicenseKind::PublicDomain));
        assert_eq!(
            " all rights reserved ".parse::<LicenseKind>(),
            Ok(LicenseKind::AllRightsReserved)
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "CC0".parse::<LicenseKind>(),
            Err(UnknownLicense("CC0".to_string()))
        );
        // Unnormalized feed codes are not accepted as-is
        assert!("cc-by".parse::<LicenseKind>().is_err());
        assert!("".parse::<LicenseKind>().is_err());
    }

    #[test]
    fn test_code_round_trip() {
        for kind in LicenseKind::ALL {
            assert_eq!(kind.code().parse::<LicenseKind>(), Ok(kind));
            assert_eq!(kind.to_string(), kind.code());
        }
    }
}
