#![allow(non_snake_case)]

use crate::network::ethernet::{ByteSerializable, EtherType, EthernetFrame};
use crate::network::ipv4::{
    checksum, mask_len, ArpFrame, ArpOperation, IcmpFrame, Ipv4Frame, PROTOCOL_ICMP,
};
use crate::network::ParseError;
use crate::{mac_addr, network_address};

#[test]
fn EthernetFrame_ToBytes_ReturnsValidByteArray() {
    // Arrange
    let frame = EthernetFrame::new(mac_addr!(2), mac_addr!(1), EtherType::Ipv4, vec![0xAB, 0xCD]);

    // Act
    let bytes = frame.to_bytes();

    // Assert
    assert_eq!(bytes.len(), 16);
    assert_eq!(bytes[0..6], mac_addr!(2)); // Destination Address
    assert_eq!(bytes[6..12], mac_addr!(1)); // Source Address
    assert_eq!(bytes[12..14], [0x08, 0x00]); // EtherType
    assert_eq!(bytes[14..16], [0xAB, 0xCD]); // Data
}

#[test]
fn EthernetFrame_FromBytes_CreatesIdenticalFrame() {
    // Arrange
    let frame = EthernetFrame::new(mac_addr!(7), mac_addr!(8), EtherType::Arp, vec![1, 2, 3, 4]);

    // Act
    let deserialized = EthernetFrame::from_bytes(&frame.to_bytes()).unwrap();

    // Assert
    assert_eq!(frame, deserialized);
}

#[test]
fn EthernetFrame_FromBytes_RuntFrame_ReturnsError() {
    // Arrange
    let bytes = [0u8; 13];

    // Act
    let result = EthernetFrame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::Runt);
}

#[test]
fn EthernetFrame_FromBytes_UnknownEtherType_ReturnsError() {
    // Arrange
    let mut bytes =
        EthernetFrame::new(mac_addr!(2), mac_addr!(1), EtherType::Ipv4, vec![]).to_bytes();
    bytes[12..14].copy_from_slice(&0x1234u16.to_be_bytes());

    // Act
    let result = EthernetFrame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::EtherType(0x1234));
}

#[test]
fn ArpFrame_FromBytes_CreatesIdenticalFrame() {
    // Arrange
    let frame = ArpFrame::new(
        ArpOperation::Request,
        mac_addr!(1),
        [10, 0, 0, 1],
        mac_addr!(0),
        [10, 0, 0, 2],
    );

    // Act
    let deserialized = ArpFrame::from_bytes(&frame.to_bytes()).unwrap();

    // Assert
    assert_eq!(frame, deserialized);
}

#[test]
fn ArpFrame_FromBytes_ToleratesLinkPadding() {
    // Arrange
    let frame = ArpFrame::new(
        ArpOperation::Reply,
        mac_addr!(1),
        [10, 0, 0, 1],
        mac_addr!(2),
        [10, 0, 0, 2],
    );
    let mut bytes = frame.to_bytes();
    bytes.resize(46, 0); // Padded to the Ethernet payload minimum

    // Act
    let deserialized = ArpFrame::from_bytes(&bytes).unwrap();

    // Assert
    assert_eq!(frame, deserialized);
}

#[test]
fn ArpFrame_FromBytes_BadHardwareType_ReturnsError() {
    // Arrange
    let mut bytes = ArpFrame::new(
        ArpOperation::Request,
        mac_addr!(1),
        [10, 0, 0, 1],
        mac_addr!(0),
        [10, 0, 0, 2],
    )
    .to_bytes();
    bytes[0..2].copy_from_slice(&6u16.to_be_bytes());

    // Act
    let result = ArpFrame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::HardwareType(6));
}

#[test]
fn ArpFrame_FromBytes_BadOpcode_ReturnsError() {
    // Arrange
    let mut bytes = ArpFrame::new(
        ArpOperation::Request,
        mac_addr!(1),
        [10, 0, 0, 1],
        mac_addr!(0),
        [10, 0, 0, 2],
    )
    .to_bytes();
    bytes[6..8].copy_from_slice(&3u16.to_be_bytes());

    // Act
    let result = ArpFrame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::Opcode(3));
}

#[test]
fn Ipv4Frame_ToBytes_HeaderChecksumVerifiesToZero() {
    // Arrange
    let frame = Ipv4Frame::new([10, 0, 0, 2], [10, 0, 0, 1], 64, vec![1, 2, 3], 0xFE);

    // Act
    let bytes = frame.to_bytes();

    // Assert
    assert_eq!(checksum(&bytes[..20]), 0);
}

#[test]
fn Ipv4Frame_FromBytes_CreatesIdenticalFrame() {
    // Arrange
    let mut frame = Ipv4Frame::new([192, 168, 1, 2], [10, 0, 0, 9], 63, vec![9, 8, 7], 0x11);
    frame.id = 4242;
    frame.flags_fragment_offset = 0x4000;

    // Act
    let deserialized = Ipv4Frame::from_bytes(&frame.to_bytes()).unwrap();

    // Assert
    assert_eq!(frame, deserialized);
}

#[test]
fn Ipv4Frame_FromBytes_WithOptions_PreservesOptionBytes() {
    // Arrange
    let mut frame = Ipv4Frame::new([192, 168, 1, 2], [10, 0, 0, 9], 64, vec![1], PROTOCOL_ICMP);
    frame.version_hlen = 0x46; // 6 words: 20 header bytes plus 4 option bytes
    frame.option = vec![0x94, 0x04, 0x00, 0x00];
    frame.total_length += 4;

    // Act
    let deserialized = Ipv4Frame::from_bytes(&frame.to_bytes()).unwrap();

    // Assert
    assert_eq!(frame, deserialized);
    assert_eq!(deserialized.header_len(), 24);
}

#[test]
fn Ipv4Frame_FromBytes_ExactlyTwentyBytes_Accepted() {
    // Arrange
    let frame = Ipv4Frame::new([1, 2, 3, 4], [5, 6, 7, 8], 64, vec![], 0xFE);

    // Act
    let bytes = frame.to_bytes();
    let deserialized = Ipv4Frame::from_bytes(&bytes).unwrap();

    // Assert
    assert_eq!(bytes.len(), 20);
    assert_eq!(frame, deserialized);
}

#[test]
fn Ipv4Frame_FromBytes_HeaderLengthBelowFiveWords_ReturnsError() {
    // Arrange
    let mut bytes = Ipv4Frame::new([1, 2, 3, 4], [5, 6, 7, 8], 64, vec![], 0xFE).to_bytes();
    bytes[0] = 0x44;

    // Act
    let result = Ipv4Frame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::HeaderLen(4));
}

#[test]
fn Ipv4Frame_FromBytes_NonIpv4Version_ReturnsError() {
    // Arrange
    let mut bytes = Ipv4Frame::new([1, 2, 3, 4], [5, 6, 7, 8], 64, vec![], 0xFE).to_bytes();
    bytes[0] = 0x65;

    // Act
    let result = Ipv4Frame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::Version(6));
}

#[test]
fn Ipv4Frame_FromBytes_CorruptedChecksum_ReturnsError() {
    // Arrange
    let mut bytes = Ipv4Frame::new([1, 2, 3, 4], [5, 6, 7, 8], 64, vec![1, 2], 0xFE).to_bytes();
    bytes[10] ^= 0xFF;

    // Act
    let result = Ipv4Frame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::Checksum);
}

#[test]
fn Ipv4Frame_FromBytes_TotalLengthPastBuffer_ReturnsError() {
    // Arrange
    let bytes = Ipv4Frame::new([1, 2, 3, 4], [5, 6, 7, 8], 64, vec![1, 2, 3], 0xFE).to_bytes();

    // Act
    let result = Ipv4Frame::from_bytes(&bytes[..bytes.len() - 1]);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::TotalLen(23));
}

#[test]
fn Ipv4Frame_FromBytes_LinkPadding_IgnoresTrailingBytes() {
    // Arrange
    let frame = Ipv4Frame::new([1, 2, 3, 4], [5, 6, 7, 8], 64, vec![1, 2, 3], 0xFE);
    let mut bytes = frame.to_bytes();
    bytes.resize(46, 0);

    // Act
    let deserialized = Ipv4Frame::from_bytes(&bytes).unwrap();

    // Assert
    assert_eq!(frame, deserialized);
}

#[test]
fn IcmpFrame_EchoRequest_FromBytes_CreatesIdenticalFrame() {
    // Arrange
    let frame = IcmpFrame::echo_request(7, 1, vec![b'a', b'b', b'c']);

    // Act
    let bytes = frame.to_bytes();
    let deserialized = IcmpFrame::from_bytes(&bytes).unwrap();

    // Assert
    assert_eq!(frame, deserialized);
    assert_eq!(checksum(&bytes), 0);
}

#[test]
fn IcmpFrame_FromBytes_CorruptedChecksum_ReturnsError() {
    // Arrange
    let mut bytes = IcmpFrame::echo_request(7, 1, vec![1, 2, 3]).to_bytes();
    bytes[8] ^= 0xFF;

    // Act
    let result = IcmpFrame::from_bytes(&bytes);

    // Assert
    assert_eq!(result.unwrap_err(), ParseError::Checksum);
}

#[test]
fn IcmpFrame_DestinationUnreachable_QuotesTwentyEightBytes() {
    // Arrange
    let offending = Ipv4Frame::new([10, 0, 0, 2], [8, 8, 8, 8], 64, vec![0xEE; 16], 0x11);
    let offending_bytes = offending.to_bytes();

    // Act
    let bytes = IcmpFrame::destination_unreachable(1, &offending_bytes).to_bytes();

    // Assert
    assert_eq!(bytes[0], 3); // Type
    assert_eq!(bytes[1], 1); // Code
    assert_eq!(bytes[4..8], [0, 0, 0, 0]); // Unused word
    assert_eq!(bytes.len(), 8 + 28);
    assert_eq!(bytes[8..36], offending_bytes[..28]);
}

#[test]
fn IcmpFrame_TimeExceeded_ShortDatagram_ZeroPadsQuote() {
    // Arrange
    let offending = Ipv4Frame::new([10, 0, 0, 2], [8, 8, 8, 8], 1, vec![], 0x11).to_bytes();

    // Act
    let frame = IcmpFrame::time_exceeded(&offending);

    // Assert
    assert_eq!(frame.data.len(), 28);
    assert_eq!(frame.data[..20], offending[..]);
    assert_eq!(frame.data[20..], [0u8; 8]);
}

#[test]
fn Checksum_OddLength_PadsFinalByteWithZero() {
    // Arrange
    let bytes = [0x01];

    // Act
    let sum = checksum(&bytes);

    // Assert
    assert_eq!(sum, !0x0100u16);
}

#[test]
fn MaskLen_CountsContiguousHighBits() {
    assert_eq!(mask_len([255, 255, 255, 0]), 24);
    assert_eq!(mask_len([255, 255, 255, 255]), 32);
    assert_eq!(mask_len([255, 255, 240, 0]), 20);
    assert_eq!(mask_len([0, 0, 0, 0]), 0);
}

#[test]
fn NetworkAddress_MasksEachOctet() {
    assert_eq!(
        network_address!([192, 168, 1, 77], [255, 255, 255, 0]),
        [192, 168, 1, 0]
    );
    assert_eq!(
        network_address!([10, 20, 30, 40], [255, 0, 0, 0]),
        [10, 0, 0, 0]
    );
}
