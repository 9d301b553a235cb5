//! Telephony audio helpers: G.711 µ-law decoding and WAV wrapping.

/// Sample rate of telephony media streams.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

const MULAW_BIAS: i16 = 0x84;

/// Decode one G.711 µ-law byte to a 16-bit linear sample.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let u = !byte;
    let sign = u & 0x80;
    let exponent = (u >> 4) & 0x07;
    let mantissa = (u & 0x0F) as i16;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if sign != 0 { -magnitude } else { magnitude }
}

/// Decode a µ-law byte stream to 16-bit PCM.
pub fn decode_mulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_linear(b)).collect()
}

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    const BITS_PER_SAMPLE: u16 = 16;
    let data_len = (pcm.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * BITS_PER_SAMPLE as u32 / 8;
    let block_align = channels * BITS_PER_SAMPLE / 8;

    let mut wav = Vec::with_capacity(44 + data_len as usize);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

/// Convert an 8 kHz mono µ-law utterance into a WAV file.
pub fn mulaw_to_wav(bytes: &[u8]) -> Vec<u8> {
    pcm_to_wav(&decode_mulaw(bytes), TELEPHONY_SAMPLE_RATE, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mulaw_silence_and_extremes() {
        assert_eq!(mulaw_to_linear(0xFF), 0);
        assert_eq!(mulaw_to_linear(0x7F), 0);
        assert_eq!(mulaw_to_linear(0x80), 32124);
        assert_eq!(mulaw_to_linear(0x00), -32124);
    }

    #[test]
    fn test_mulaw_sign_symmetry() {
        for b in 0x00u8..0x80 {
            assert_eq!(mulaw_to_linear(b), -mulaw_to_linear(b | 0x80));
        }
    }

    #[test]
    fn test_wav_header() {
        let wav = mulaw_to_wav(&[0xFF; 8000]);
        assert_eq!(wav.len(), 44 + 8000 * 2);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 8000);
        let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_len, 16000);
        assert!(wav[44..].iter().all(|&b| b == 0));
    }
}
