// Data type tags and the TypeSet bit-set used to request several types at once
use serde::{Deserialize, Serialize};

/// A single importable kind of data. The discriminant is the tag's bit index
/// inside a [`TypeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Temperature,
    WindSpeed,
    CloudAmount,
    PredictedTemperature,
    PredictedWindSpeed,
    PredictedCloudAmount,
    AverageTemperature,
    AverageMinTemperature,
    AverageMaxTemperature,
    ElectricityConsumption,
    ElectricityProduction,
    NuclearPowerProduction,
    HydroPowerProduction,
    WindPowerProduction,
    PredictedElectricityConsumption,
    PredictedElectricityProduction,
    PredictedNuclearPowerProduction,
    PredictedHydroPowerProduction,
    PredictedWindPowerProduction,
}

/// Name used for the empty set and for anything that is not a single known tag.
pub const NONE_NAME: &str = "None";

impl DataType {
    pub const ALL: [DataType; 19] = [
        DataType::Temperature,
        DataType::WindSpeed,
        DataType::CloudAmount,
        DataType::PredictedTemperature,
        DataType::PredictedWindSpeed,
        DataType::PredictedCloudAmount,
        DataType::AverageTemperature,
        DataType::AverageMinTemperature,
        DataType::AverageMaxTemperature,
        DataType::ElectricityConsumption,
        DataType::ElectricityProduction,
        DataType::NuclearPowerProduction,
        DataType::HydroPowerProduction,
        DataType::WindPowerProduction,
        DataType::PredictedElectricityConsumption,
        DataType::PredictedElectricityProduction,
        DataType::PredictedNuclearPowerProduction,
        DataType::PredictedHydroPowerProduction,
        DataType::PredictedWindPowerProduction,
    ];

    pub fn bit_index(self) -> u32 {
        self as u32
    }

    pub fn from_bit_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Temperature => "Temperature",
            DataType::WindSpeed => "Wind Speed",
            DataType::CloudAmount => "Cloud Amount",
            DataType::PredictedTemperature => "Predicted Temperature",
            DataType::PredictedWindSpeed => "Predicted Wind Speed",
            DataType::PredictedCloudAmount => "Predicted Cloud Amount",
            DataType::AverageTemperature => "Average Temperature",
            DataType::AverageMinTemperature => "Average Minimum Temperature",
            DataType::AverageMaxTemperature => "Average Maximum Temperature",
            DataType::ElectricityConsumption => "Electricity Consumption",
            DataType::ElectricityProduction => "Electricity Production",
            DataType::NuclearPowerProduction => "Nuclear Power Production",
            DataType::HydroPowerProduction => "Hydropower Production",
            DataType::WindPowerProduction => "Wind Power Production",
            DataType::PredictedElectricityConsumption => "Predicted Electricity Consumption",
            DataType::PredictedElectricityProduction => "Predicted Electricity Production",
            DataType::PredictedNuclearPowerProduction => "Predicted Nuclear Power Production",
            DataType::PredictedHydroPowerProduction => "Predicted Hydropower Production",
            DataType::PredictedWindPowerProduction => "Predicted Wind Power Production",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

/// Bit-set over [`DataType`] tags. Only bits of known tags are ever set, so
/// [`TypeSet::decompose`] is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSet(u64);

impl TypeSet {
    pub const NONE: TypeSet = TypeSet(0);

    pub fn all() -> Self {
        Self::of(&DataType::ALL)
    }

    pub fn of(types: &[DataType]) -> Self {
        types
            .iter()
            .fold(Self::NONE, |set, t| set.union(TypeSet::from(*t)))
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: TypeSet) -> TypeSet {
        TypeSet(self.0 | other.0)
    }

    pub fn intersect(self, other: TypeSet) -> TypeSet {
        TypeSet(self.0 & other.0)
    }

    /// Complement within the closed set of known tags.
    pub fn complement(self) -> TypeSet {
        TypeSet(!self.0 & Self::all().0)
    }

    /// True iff the two sets share at least one tag.
    pub fn contains(self, other: TypeSet) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Singleton tags in ascending bit order.
    pub fn decompose(self) -> Vec<DataType> {
        (0..u64::BITS)
            .filter(|i| self.0 & (1u64 << i) != 0)
            .filter_map(DataType::from_bit_index)
            .collect()
    }

    pub fn single(self) -> Option<DataType> {
        match self.decompose().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        self.single().map(DataType::name).unwrap_or(NONE_NAME)
    }

    /// Unknown names map to the empty set.
    pub fn from_name(name: &str) -> TypeSet {
        DataType::from_name(name)
            .map(TypeSet::from)
            .unwrap_or(TypeSet::NONE)
    }
}

impl From<DataType> for TypeSet {
    fn from(data_type: DataType) -> Self {
        TypeSet(1u64 << data_type.bit_index())
    }
}
