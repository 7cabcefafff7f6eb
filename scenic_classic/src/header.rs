use std::fmt;

/// The four accepted header lines. Each gates a grammar variant: the X3D
/// variants enable `META`/`PROFILE`, the extended variants additionally enable
/// the SFVec4f/SFMatrix3f/SFMatrix4f type keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Vrml,
    X3d,
    ExtendedVrml,
    ExtendedX3d,
}

impl HeaderKind {
    pub const ALL: [HeaderKind; 4] = [
        HeaderKind::Vrml,
        HeaderKind::X3d,
        HeaderKind::ExtendedVrml,
        HeaderKind::ExtendedX3d,
    ];

    pub const fn line(self) -> &'static str {
        match self {
            HeaderKind::Vrml => "#VRML V2.0 utf8",
            HeaderKind::X3d => "#X3D V3.0 utf8",
            HeaderKind::ExtendedVrml => "#OVRML V2.0 utf8",
            HeaderKind::ExtendedX3d => "#OX3D V3.0 utf8",
        }
    }

    /// File extension, lower case, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            HeaderKind::Vrml => "wrl",
            HeaderKind::X3d => "x3dv",
            HeaderKind::ExtendedVrml => "owrl",
            HeaderKind::ExtendedX3d => "ox3dv",
        }
    }

    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim_end();
        Self::ALL.into_iter().find(|kind| kind.line() == line)
    }

    /// Case-insensitive.
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(extension))
    }

    #[inline]
    pub const fn has_x3d_keywords(self) -> bool {
        matches!(self, HeaderKind::X3d | HeaderKind::ExtendedX3d)
    }

    #[inline]
    pub const fn has_extended_types(self) -> bool {
        matches!(self, HeaderKind::ExtendedVrml | HeaderKind::ExtendedX3d)
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_and_extensions_map_both_ways() {
        for kind in HeaderKind::ALL {
            assert_eq!(HeaderKind::from_line(kind.line()), Some(kind));
            assert_eq!(HeaderKind::from_extension(kind.extension()), Some(kind));
        }
        assert_eq!(HeaderKind::from_extension("WRL"), Some(HeaderKind::Vrml));
        assert_eq!(HeaderKind::from_line("#VRML V2.0 utf8  \r"), Some(HeaderKind::Vrml));
        assert_eq!(HeaderKind::from_line("#VRML V1.0 ascii"), None);
        assert_eq!(HeaderKind::from_extension("obj"), None);
    }

    #[test]
    fn variants() {
        assert!(!HeaderKind::Vrml.has_x3d_keywords());
        assert!(HeaderKind::X3d.has_x3d_keywords());
        assert!(!HeaderKind::X3d.has_extended_types());
        assert!(HeaderKind::ExtendedVrml.has_extended_types());
        assert!(HeaderKind::ExtendedX3d.has_x3d_keywords());
    }
}
