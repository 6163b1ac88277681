use bitflags::bitflags;
use rdpflow_core::{
    Buffer, BufferMut, CharacterSet, DecodeError, DecodeResult, Encode, EncodeError, EncodeResult,
};

/// Capability set header: 16-bit type plus 16-bit total length including
/// this header.
const CAPABILITY_HEADER_SIZE: usize = 4;

/// The only capability set this engine interprets; everything else is
/// carried opaquely and skipped by its declared length.
pub const CAPSTYPE_BITMAP: u16 = 0x0002;

const BITMAP_CAPABILITY_SIZE: usize = 24;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BitmapDrawingFlags: u8 {
        const ALLOW_DYNAMIC_COLOR_FIDELITY = 0x02;
        const ALLOW_COLOR_SUBSAMPLING = 0x04;
        const ALLOW_SKIP_ALPHA = 0x08;
    }
}

/// TS_BITMAP_CAPABILITYSET: the pixel depth and desktop size the server
/// demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapCapability {
    pub pref_bits_per_pix: u16,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub desktop_resize_flag: bool,
    pub drawing_flags: BitmapDrawingFlags,
}

impl BitmapCapability {
    fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let pref_bits_per_pix = src.read_u16()?;
        src.skip(6)?; // receive1/4/8BitsPerPixel, must-be-true legacy fields
        let desktop_width = src.read_u16()?;
        let desktop_height = src.read_u16()?;
        src.skip(2)?; // padding
        let desktop_resize_flag = src.read_u16()? != 0;
        src.skip(2)?; // bitmapCompressionFlag
        src.skip(1)?; // highColorFlags
        let drawing_flags = BitmapDrawingFlags::from_bits_truncate(src.read_u8()?);
        src.skip(2)?; // multipleRectangleSupport
        src.skip(2)?; // padding
        Ok(Self {
            pref_bits_per_pix,
            desktop_width,
            desktop_height,
            desktop_resize_flag,
            drawing_flags,
        })
    }

    fn encode(&self, dst: &mut BufferMut) {
        dst.write_u16(self.pref_bits_per_pix);
        dst.write_u16(1); // receive1BitPerPixel
        dst.write_u16(1); // receive4BitsPerPixel
        dst.write_u16(1); // receive8BitsPerPixel
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        dst.write_padding(2);
        dst.write_u16(u16::from(self.desktop_resize_flag));
        dst.write_u16(1); // bitmapCompressionFlag
        dst.write_u8(0); // highColorFlags
        dst.write_u8(self.drawing_flags.bits());
        dst.write_u16(1); // multipleRectangleSupport
        dst.write_padding(2);
    }
}

/// One capability set of a (demand|confirm)-active PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    Bitmap(BitmapCapability),
    /// Any set this engine does not interpret, kept verbatim.
    Other { set_type: u16, payload: Buffer },
}

impl CapabilitySet {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let set_type = src.read_u16()?;
        let length = usize::from(src.read_u16()?);
        let body_length = length
            .checked_sub(CAPABILITY_HEADER_SIZE)
            .ok_or_else(|| DecodeError::invalid_field("lengthCapability", "shorter than its header"))?;
        let mut payload = src.read_slice(body_length)?;

        if set_type == CAPSTYPE_BITMAP {
            Ok(Self::Bitmap(BitmapCapability::decode(&mut payload)?))
        } else {
            Ok(Self::Other { set_type, payload })
        }
    }

    pub fn size(&self) -> usize {
        CAPABILITY_HEADER_SIZE
            + match self {
                Self::Bitmap(_) => BITMAP_CAPABILITY_SIZE,
                Self::Other { payload, .. } => payload.len(),
            }
    }

    pub fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        let length: u16 = self
            .size()
            .try_into()
            .map_err(|_| EncodeError::field_overflow("lengthCapability", "capability too large"))?;
        match self {
            Self::Bitmap(bitmap) => {
                dst.write_u16(CAPSTYPE_BITMAP);
                dst.write_u16(length);
                bitmap.encode(dst);
            }
            Self::Other { set_type, payload } => {
                dst.write_u16(*set_type);
                dst.write_u16(length);
                dst.write_slice(payload.as_slice());
            }
        }
        Ok(())
    }
}

/// TS_DEMAND_ACTIVE_PDU body (share id already consumed with the control
/// header): source descriptor plus the combined capability sets. Also the
/// body of a confirm-active PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandActive {
    pub source_descriptor: String,
    pub capability_sets: Vec<CapabilitySet>,
}

impl DemandActive {
    const NAME: &'static str = "DemandActive";

    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let source_descriptor_length = usize::from(src.read_u16()?);
        // Combined size of numberCapabilities, padding and the sets;
        // the per-set walk below covers it.
        let _combined_capabilities_length = src.read_u16()?;
        let source_descriptor = src.read_string(source_descriptor_length, CharacterSet::Ansi)?;

        let capability_count = usize::from(src.read_u16()?);
        src.skip(2)?; // padding

        let mut capability_sets = Vec::with_capacity(capability_count);
        for _ in 0..capability_count {
            capability_sets.push(CapabilitySet::decode(src)?);
        }

        Ok(Self {
            source_descriptor,
            capability_sets,
        })
    }

    /// The server demand-active carries the bitmap capability describing
    /// the session's pixel format and desktop size.
    pub fn bitmap_capability(&self) -> Option<&BitmapCapability> {
        self.capability_sets.iter().find_map(|set| match set {
            CapabilitySet::Bitmap(bitmap) => Some(bitmap),
            CapabilitySet::Other { .. } => None,
        })
    }
}

impl Encode for DemandActive {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        let combined_length: u16 = (self
            .capability_sets
            .iter()
            .map(CapabilitySet::size)
            .sum::<usize>()
            + 4)
            .try_into()
            .map_err(|_| {
                EncodeError::field_overflow("lengthCombinedCapabilities", "capabilities too large")
            })?;

        dst.write_u16(
            (self.source_descriptor.len() + 1)
                .try_into()
                .map_err(|_| {
                    EncodeError::field_overflow("lengthSourceDescriptor", "descriptor too long")
                })?,
        );
        dst.write_u16(combined_length);
        dst.write_string_nul(&self.source_descriptor, CharacterSet::Ansi);
        dst.write_u16(
            self.capability_sets
                .len()
                .try_into()
                .map_err(|_| EncodeError::field_overflow("numberCapabilities", "too many sets"))?,
        );
        dst.write_padding(2);

        for set in &self.capability_sets {
            set.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        2 + 2
            + self.source_descriptor.len()
            + 1
            + 2
            + 2
            + self
                .capability_sets
                .iter()
                .map(CapabilitySet::size)
                .sum::<usize>()
    }
}

/// Server demand-active: the shared body plus a trailing session id the
/// client ignores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDemandActive {
    pub pdu: DemandActive,
}

impl ServerDemandActive {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let pdu = DemandActive::decode(src)?;
        src.skip(4)?; // sessionId
        Ok(Self { pdu })
    }
}

/// Client confirm-active: an originator id in front of the shared body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirmActive {
    pub originator_id: u16,
    pub pdu: DemandActive,
}

impl Encode for ClientConfirmActive {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        dst.write_u16(self.originator_id);
        self.pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        "ClientConfirmActive"
    }

    fn size(&self) -> usize {
        2 + self.pdu.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdpflow_core::encode_to_buffer;

    fn bitmap_24bpp() -> BitmapCapability {
        BitmapCapability {
            pref_bits_per_pix: 24,
            desktop_width: 1280,
            desktop_height: 1024,
            desktop_resize_flag: true,
            drawing_flags: BitmapDrawingFlags::empty(),
        }
    }

    #[test]
    fn bitmap_capability_round_trip() {
        let mut dst = BufferMut::with_capacity(BITMAP_CAPABILITY_SIZE);
        bitmap_24bpp().encode(&mut dst);
        let mut src = dst.freeze();
        assert_eq!(src.len(), BITMAP_CAPABILITY_SIZE);
        assert_eq!(BitmapCapability::decode(&mut src).unwrap(), bitmap_24bpp());
    }

    #[test]
    fn demand_active_walks_unknown_sets_by_length() {
        let pdu = DemandActive {
            source_descriptor: "RDP".to_owned(),
            capability_sets: vec![
                CapabilitySet::Other {
                    set_type: 0x001a,
                    payload: Buffer::from_static(&[1, 2, 3, 4, 5, 6]),
                },
                CapabilitySet::Bitmap(bitmap_24bpp()),
                CapabilitySet::Other {
                    set_type: 0x000d,
                    payload: Buffer::from_static(&[0; 84]),
                },
            ],
        };

        let mut encoded = encode_to_buffer(&pdu).unwrap();
        assert_eq!(encoded.len(), pdu.size());

        let decoded = DemandActive::decode(&mut encoded).unwrap();
        assert_eq!(decoded, pdu);
        assert_eq!(decoded.bitmap_capability().unwrap().desktop_width, 1280);
    }
}
