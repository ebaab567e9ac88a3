//! Classification task presets per image domain.

use std::fmt;
use std::str::FromStr;

use crate::imagery::AssetKind;

/// One classification question asked of every image in a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Key for per-task model overrides in `[classify.models]`.
    pub name: &'static str,
    /// Output field in the classification record.
    pub field: &'static str,
    pub prompt: &'static str,
}

const HOUSE_TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "swimming_pool",
        field: "Swimming_Pool_Prediction",
        prompt: "You are given a remote sensing image. Determine whether it has swimming pools (YES:1, NO:0). \
                 Output: 'Filename: <filename>, Type: <1or0>'.",
    },
    TaskSpec {
        name: "roof_type",
        field: "Roof_Type_Prediction",
        prompt: "You are given a remote sensing image. Determine the roof type (0: flat, 1: gabled, 2: hipped). \
                 Output: 'Filename: <filename>, Type_Class: <class>'.",
    },
    TaskSpec {
        name: "green",
        field: "Green_Prediction",
        prompt: "You are given a remote sensing image. Determine the vegetation cover density class \
                 (0: 0-10%, 1: 10-30%, 2: 30-60%, 3: 60%+). \
                 Output: 'Filename: <filename>, Vegetation_Cover_Class: <class>'.",
    },
];

const NEIGHBOR_TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "building_footprint",
        field: "Building_Footprint_Prediction",
        prompt: "Classify some building footprint types for a remote sensing image considering the following parameters: \
                 Building Density 0 (0-10%), 1 (10-25%), 2 (25%-100%); \
                 Large Building Count: 0(0), 1(1-5), 2(5-20), 3(20 and more than); \
                 Building Distribution Patterns: 0 (clustered), 1(random), 2 (uniform). \
                 Output format: Filename: <filename>, BD: <density_class>, LB: <building_count_class>, BDP: <Patterns_class>.",
    },
    TaskSpec {
        name: "land_use",
        field: "Land_Use_Prediction",
        prompt: "Classify the land use type for a remote sensing image. Possible classes: \
                 0 (agriculturalland), 1 (bareland), 2 (educationalland), 3 (greenspace), 4 (industrialland), \
                 5 (publiccommercialland), 6 (residentialland), 7 (transportationland), 8 (waterbody), 9 (woodland). \
                 Output: 'Filename: <filename>, Type_Class: <class>'. Each image can have multiple classes.",
    },
    TaskSpec {
        name: "road_network",
        field: "Road_Prediction",
        prompt: "Classify some Road Network types for a remote sensing image considering the following parameters: \
                 Road Coverage Ratio (RCR) 0 (0%-10%), 1 (10%-30%), 2 (30%-50%), 3 (Above 50%); \
                 Fractal Dimension FD (Road Network Complexity): \
                 0 (Simple), 1 (Mildly Complex), 2 (Moderately Complex), 3 (Highly Complex). \
                 Output format: 'Filename: <filename>, RCR: <rcr_class>, FD: <fd_class>'.",
    },
];

const STREETVIEW_TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "wwr",
        field: "WWR_Prediction",
        prompt: "You are given a street view image. Determine the WWR class for the image based on its \
                 window-to-wall ratio (WWR). The WWR classes are as follows: 0 (0-20%), 1 (20-40%), 2 (40-60%), 3 (60-100%). \
                 Output format: 'Filename: <filename>, WWR_Class: <class>'. Only output the filename and WWR class.",
    },
    TaskSpec {
        name: "property_type",
        field: "Property_Type_Prediction",
        prompt: "You are given a streetview image. Determine the Building Property type class for the image. \
                 The Building Property type classes are as follows: Single Family 0, Apartment 1, Multi-Family 2, \
                 Manufactured 3, Condo 4, Townhouse 5, other 6. \
                 Output format: 'Filename: <filename>, Type_Class: <class>'. Only output the filename and Type class.",
    },
    TaskSpec {
        name: "floor_count",
        field: "Floor_Count_Prediction",
        prompt: "You are given a street view image. Determine the floor count of the building in the image. \
                 Output format: 'Filename: <filename>, FloorCount: <Count>'. Only output the filename and floorcount.",
    },
];

/// Image domains, each with its own task set and checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    House,
    Neighbor,
    StreetView,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::StreetView, Domain::Neighbor, Domain::House];

    pub fn tasks(&self) -> &'static [TaskSpec] {
        match self {
            Domain::House => HOUSE_TASKS,
            Domain::Neighbor => NEIGHBOR_TASKS,
            Domain::StreetView => STREETVIEW_TASKS,
        }
    }

    /// Images this domain classifies.
    pub fn asset_kind(&self) -> AssetKind {
        match self {
            Domain::House => AssetKind::House,
            Domain::Neighbor => AssetKind::Neighbor,
            Domain::StreetView => AssetKind::StreetView,
        }
    }

    /// Suffix of the checkpoint file, `<job>_<slug>.jsonl`.
    pub fn slug(&self) -> &'static str {
        match self {
            Domain::House => "house",
            Domain::Neighbor => "neighbor",
            Domain::StreetView => "svi",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<AssetKind>().map(|kind| match kind {
            AssetKind::House => Domain::House,
            AssetKind::Neighbor => Domain::Neighbor,
            AssetKind::StreetView => Domain::StreetView,
        })
    }
}
