use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A stored string did not name any variant of the enum it was read into.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed vocabulary that is stored and serialized as snake_case text.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

// -- Listings --

text_enum! {
    RoomType {
        Single => "single",
        Double => "double",
        Ensuite => "ensuite",
        Studio => "studio",
        Shared => "shared",
    }
}

text_enum! {
    Furnished {
        Fully => "fully",
        Part => "part",
        Unfurnished => "unfurnished",
    }
}

text_enum! {
    Bills {
        Included => "included",
        NotIncluded => "not_included",
        Partial => "partial",
    }
}

text_enum! {
    Amenity {
        Wifi => "wifi",
        WashingMachine => "washing_machine",
        Dishwasher => "dishwasher",
        Parking => "parking",
        Garden => "garden",
        Gym => "gym",
        CentralHeating => "central_heating",
        DoubleGlazing => "double_glazing",
        SecuritySystem => "security_system",
        BikeStorage => "bike_storage",
    }
}

text_enum! {
    /// Lifecycle of a listing. Withdrawing never removes the row; every
    /// active-only read path filters on this.
    ListingStatus {
        Active => "active",
        Withdrawn => "withdrawn",
    }
}

impl ListingStatus {
    pub fn is_active(self) -> bool {
        self == ListingStatus::Active
    }
}

/// Most image references a listing may carry.
pub const MAX_IMAGES: usize = 5;

/// Ordered, fixed-size image slots of a listing. Empty slots are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSlots(pub [Option<String>; MAX_IMAGES]);

impl ImageSlots {
    /// Packs references into the leading slots. Returns `None` if there are
    /// more references than slots.
    pub fn from_refs<I, S>(refs: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slots: [Option<String>; MAX_IMAGES] = Default::default();
        for (i, r) in refs.into_iter().enumerate() {
            *slots.get_mut(i)? = Some(r.into());
        }
        Some(Self(slots))
    }

    /// Filled slots in slot order.
    pub fn filled(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|s| s.as_deref())
    }
}

// -- Moderation --

text_enum! {
    ReportKind {
        Scam => "scam",
        Incorrect => "incorrect",
        Inappropriate => "inappropriate",
        Duplicate => "duplicate",
        Unavailable => "unavailable",
        Discrimination => "discrimination",
        Safety => "safety",
        Other => "other",
    }
}

impl ReportKind {
    pub fn label(self) -> &'static str {
        match self {
            ReportKind::Scam => "Scam/Fraudulent Listing",
            ReportKind::Incorrect => "Incorrect Information",
            ReportKind::Inappropriate => "Inappropriate Content",
            ReportKind::Duplicate => "Duplicate Listing",
            ReportKind::Unavailable => "Property No Longer Available",
            ReportKind::Discrimination => "Discriminatory Content",
            ReportKind::Safety => "Safety Concerns",
            ReportKind::Other => "Other Issue",
        }
    }
}

text_enum! {
    ReportStatus {
        Pending => "pending",
        UnderReview => "under_review",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
}

impl ReportStatus {
    pub fn label(self) -> &'static str {
        match self {
            ReportStatus::Pending => "Pending Review",
            ReportStatus::UnderReview => "Under Review",
            ReportStatus::Resolved => "Resolved",
            ReportStatus::Dismissed => "Dismissed",
        }
    }

    fn stage(self) -> u8 {
        match self {
            ReportStatus::Pending => 0,
            ReportStatus::UnderReview => 1,
            ReportStatus::Resolved | ReportStatus::Dismissed => 2,
        }
    }

    /// Reports only move forward: pending, then under review, then one of the
    /// two terminal outcomes. Skipping review is allowed.
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        next.stage() > self.stage()
    }
}

// -- Presence --

/// Activity newer than this counts as online.
pub const PRESENCE_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Online,
    Idle,
    Offline,
}

impl Presence {
    pub fn derive(is_online: bool, last_activity: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if !is_online {
            return Presence::Offline;
        }
        match last_activity {
            Some(at) if now - at < Duration::minutes(PRESENCE_WINDOW_MINUTES) => Presence::Online,
            _ => Presence::Idle,
        }
    }
}
