//! HPS service schema: UUIDs, characteristic properties, size limits.
//!
//! One primary GATT service with five implemented characteristics:
//!
//! ```text
//! ┌───────────────┬────────┬────────────────┬─────────────────────────────┐
//! │ Name          │ UUID   │ Properties     │ Role                        │
//! ├───────────────┼────────┼────────────────┼─────────────────────────────┤
//! │ HTTP URI      │ 0x2AB6 │ write          │ request URI (host + path)   │
//! │ HTTP Headers  │ 0x2AB7 │ write, read    │ request (W) / response (R)  │
//! │ HTTP Status   │ 0x2AB8 │ notify         │ status code + data flags    │
//! │ HTTP Body     │ 0x2AB9 │ write, read    │ request (W) / response (R)  │
//! │ HTTP Control  │ 0x2ABA │ write (no-rsp) │ opcode; triggers dispatch   │
//! └───────────────┴────────┴────────────────┴─────────────────────────────┘
//! ```
//!
//! 16-bit assigned numbers expand against the Bluetooth base UUID
//! (`0000xxxx-0000-1000-8000-00805f9b34fb`).

use uuid::Uuid;

/// HPS primary service UUID (Bluetooth SIG assigned).
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0136bd82_ba81_48c6_b608_df7aa274338a);

/// Historical gateway instance identifier carried over from early
/// deployments; not part of the GATT schema.
pub const PERIPHERAL_ID: Uuid = Uuid::from_u128(0xb4a77f05_2524_4330_bcbb_5aafd2a9329b);

/// Default advertised local name; overridable via `--name`.
pub const DEVICE_NAME: &str = "davidoram/HPS";

/// Bluetooth base UUID with the 16-bit slot zeroed.
const BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit assigned number into a full 128-bit UUID.
pub const fn uuid16(assigned: u16) -> Uuid {
    Uuid::from_u128(BASE_UUID | ((assigned as u128) << 96))
}

/// HTTP URI characteristic (0x2AB6).
pub const HTTP_URI: Uuid = uuid16(0x2AB6);
/// HTTP Headers characteristic (0x2AB7).
pub const HTTP_HEADERS: Uuid = uuid16(0x2AB7);
/// HTTP Status Code characteristic (0x2AB8).
pub const HTTP_STATUS: Uuid = uuid16(0x2AB8);
/// HTTP Entity Body characteristic (0x2AB9).
pub const HTTP_BODY: Uuid = uuid16(0x2AB9);
/// HTTP Control Point characteristic (0x2ABA).
pub const HTTP_CONTROL: Uuid = uuid16(0x2ABA);
/// HTTPS Security characteristic (0x2ABB). Declared, not implemented.
pub const HTTPS_SECURITY: Uuid = uuid16(0x2ABB);
/// TDS Control Point characteristic (0x2ABC). Declared, not implemented.
pub const TDS_CONTROL_POINT: Uuid = uuid16(0x2ABC);

/// Client Characteristic Configuration descriptor (0x2902).
pub const CCC_DESCRIPTOR: Uuid = uuid16(0x2902);

/// ATT MTU the peripheral requests on connect. A request component must
/// fit a single write at this MTU; there is no segmentation layer.
pub const REQUESTED_MTU: u16 = 500;

/// Maximum size of an encoded response header block. Longer blocks are
/// cut at an entry boundary and reported via the headers-truncated flag.
pub const HEADER_MAX_OCTETS: usize = 512;

/// Maximum size of a stored response body. Longer bodies keep the prefix
/// that fits and report the body-truncated flag.
pub const BODY_MAX_OCTETS: usize = 512;

/// Characteristic property bits as used by [`CharacteristicSpec`].
pub mod props {
    /// Central may read the value.
    pub const READ: u8 = 0b0000_0001;
    /// Central may write with response.
    pub const WRITE: u8 = 0b0000_0010;
    /// Central may write without response.
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0b0000_0100;
    /// Peripheral may notify the value.
    pub const NOTIFY: u8 = 0b0000_1000;

    /// Check if a specific property bit is set.
    #[inline]
    pub fn has_prop(properties: u8, prop: u8) -> bool {
        properties & prop != 0
    }
}

/// Static description of one HPS characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicSpec {
    /// Human-readable name, used in logs and missing-characteristic errors.
    pub name: &'static str,
    /// Full 128-bit UUID.
    pub uuid: Uuid,
    /// Property bits from [`props`].
    pub properties: u8,
}

/// The five characteristics the service implements, in declaration order.
pub const CHARACTERISTICS: [CharacteristicSpec; 5] = [
    CharacteristicSpec {
        name: "HTTP URI",
        uuid: HTTP_URI,
        properties: props::WRITE,
    },
    CharacteristicSpec {
        name: "HTTP Headers",
        uuid: HTTP_HEADERS,
        properties: props::WRITE | props::READ,
    },
    CharacteristicSpec {
        name: "HTTP Status Code",
        uuid: HTTP_STATUS,
        properties: props::NOTIFY,
    },
    CharacteristicSpec {
        name: "HTTP Entity Body",
        uuid: HTTP_BODY,
        properties: props::WRITE | props::READ,
    },
    CharacteristicSpec {
        name: "HTTP Control Point",
        uuid: HTTP_CONTROL,
        properties: props::WRITE | props::WRITE_WITHOUT_RESPONSE,
    },
];

/// Look up the static spec for a characteristic UUID.
pub fn spec_for(uuid: Uuid) -> Option<&'static CharacteristicSpec> {
    CHARACTERISTICS.iter().find(|c| c.uuid == uuid)
}
