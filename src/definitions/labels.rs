//! Label sets of the categorised variables

use crate::query::CategoryLabel;

macro_rules! category_label {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl CategoryLabel for $name {
            fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            fn variants() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }
    };
}

category_label! {
    /// Smoking status from the most recent clear smoking code
    SmokingStatus {
        /// Current smoker
        Smoker => "S",
        /// Ex-smoker, or recorded as never but smoked at some point
        ExSmoker => "E",
        /// Never smoked
        Never => "N",
        /// No usable record
        Missing => "M",
    }
}

category_label! {
    /// Asthma severity by recent oral steroid use
    AsthmaStatus {
        /// No asthma
        None => "0",
        /// Asthma without recent oral steroids
        WithoutSteroids => "1",
        /// Asthma with one to four recent prednisolone issues
        WithSteroids => "2",
    }
}

category_label! {
    /// Care-home type of the patient's address
    CareHomeType {
        /// Care home without nursing
        Residential => "PC",
        /// Nursing home
        Nursing => "PN",
        /// Care home of unknown type
        Unspecified => "PS",
        /// Not a care home
        PrivateHome => "U",
    }
}
