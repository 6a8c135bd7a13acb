// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command layer
//!
//! For every command there are four entry points:
//!   - `serialize_command_x` builds the wire-format command buffer,
//!     consulting the authorization delegate for session data and
//!     parameter encryption;
//!   - `parse_response_x` decodes a wire-format response into typed
//!     outputs, consulting the delegate for session verification and
//!     parameter decryption;
//!   - `Tpm::x_sync` runs build, blocking transport and parse;
//!   - `Tpm::x` does the same over the transceiver's callback path.
//!
//! The builder/parser pairs are pure: all state lives in the delegate and
//! the transceiver. Within one invocation the order is strictly
//! build, transport, parse.

#![allow(clippy::too_many_arguments)]

use sha2::{Digest, Sha256};

use super::authorization::AuthorizationDelegate;
use super::constants::*;
use super::error::{TpmRc, TpmResult};
use super::marshal::{CommandBuffer, Marshal, ResponseBuffer, Unmarshal};
use super::transceiver::CommandTransceiver;
use super::types::*;

/// The name of an entity addressed by a permanent or otherwise unnamed
/// handle: the big-endian handle value itself.
pub fn name_from_handle(handle: TpmHandle) -> [u8; 4] {
    handle.to_be_bytes()
}

/// Encrypts the content of a serialized TPM2B parameter in place, leaving
/// the 2-byte size prefix untouched.
fn encrypt_parameter(
    delegate: &mut (dyn AuthorizationDelegate + '_),
    parameter: &mut Vec<u8>,
) -> TpmResult<()> {
    if parameter.len() < 2 {
        return Err(TpmRc::INSUFFICIENT);
    }
    let mut content = parameter.split_off(2);
    if !delegate.encrypt_command_parameter(&mut content) {
        return Err(TpmRc::ENCRYPTION_FAILED);
    }
    parameter.extend_from_slice(&content);
    Ok(())
}

/// Decrypts the content of a serialized TPM2B parameter in place, leaving
/// the 2-byte size prefix untouched.
fn decrypt_parameter(
    delegate: &mut (dyn AuthorizationDelegate + '_),
    parameter: &mut Vec<u8>,
) -> TpmResult<()> {
    if parameter.len() < 2 {
        return Err(TpmRc::INSUFFICIENT);
    }
    let mut content = parameter.split_off(2);
    if !delegate.decrypt_response_parameter(&mut content) {
        return Err(TpmRc::ENCRYPTION_FAILED);
    }
    parameter.extend_from_slice(&content);
    Ok(())
}

/// Assembles the final command buffer: tag, total size, command code,
/// handles, authorization area (when the delegate supplies one) and
/// parameters. The parameter hash handed to the delegate covers the
/// command code, the handle names and the already-encrypted parameters.
fn assemble_command(
    code: TpmCc,
    handles: &[TpmHandle],
    handle_names: &[&[u8]],
    parameters: &[&[u8]],
    is_command_parameter_encryption_possible: bool,
    is_response_parameter_encryption_possible: bool,
    delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    debug_assert_eq!(handles.len(), number_of_request_handles(code));
    debug_assert_eq!(handles.len(), handle_names.len());

    let mut authorization = Vec::new();
    if let Some(delegate) = delegate {
        let mut hash = Sha256::new();
        hash.update(code.to_u32().to_be_bytes());
        for name in handle_names {
            hash.update(name);
        }
        for parameter in parameters {
            hash.update(parameter);
        }
        authorization = delegate
            .get_command_authorization(
                &hash.finalize(),
                is_command_parameter_encryption_possible,
                is_response_parameter_encryption_possible,
            )
            .ok_or(TpmRc::AUTHORIZATION_FAILED)?;
    }
    let tag = if authorization.is_empty() {
        TpmSt::NoSessions
    } else {
        TpmSt::Sessions
    };

    let mut buf = CommandBuffer::with_capacity(64);
    buf.put_u16(tag.to_u16());
    buf.put_u32(0); // patched below once the total length is known
    buf.put_u32(code.to_u32());
    for handle in handles {
        buf.put_u32(*handle);
    }
    if tag == TpmSt::Sessions {
        buf.put_u32(authorization.len() as u32);
        buf.put_bytes(&authorization);
    }
    for parameter in parameters {
        buf.put_bytes(parameter);
    }
    let total = buf.len() as u32;
    buf.update_u32(2, total);
    Ok(buf.into_vec())
}

struct DecodedResponse {
    handles: Vec<TpmHandle>,
    parameters: Vec<u8>,
    has_sessions: bool,
}

/// Validates the response header, short-circuits on a device error,
/// extracts output handles and splits the parameter section from the
/// authorization area, verifying the latter through the delegate.
fn decode_response(
    code: TpmCc,
    response: &[u8],
    mut delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<DecodedResponse> {
    let mut buf = ResponseBuffer::new(response);
    let tag = TpmSt::unmarshal(&mut buf)?;
    if !matches!(tag, TpmSt::NoSessions | TpmSt::Sessions) {
        return Err(TpmRc::BAD_TAG);
    }
    let size = buf.get_u32()? as usize;
    if size != response.len() {
        return Err(TpmRc::SIZE);
    }
    let rc = TpmRc(buf.get_u32()?);
    if !rc.is_success() {
        return Err(rc);
    }

    let mut handles = Vec::new();
    for _ in 0..number_of_response_handles(code) {
        handles.push(buf.get_u32()?);
    }

    if tag == TpmSt::Sessions {
        let parameter_size = buf.get_u32()? as usize;
        if parameter_size > buf.remaining() {
            return Err(TpmRc::INSUFFICIENT);
        }
        let parameters = buf.get_bytes(parameter_size)?;
        let authorization = buf.get_remaining();

        let mut hash = Sha256::new();
        hash.update(rc.0.to_be_bytes());
        hash.update(code.to_u32().to_be_bytes());
        hash.update(&parameters);
        let response_hash = hash.finalize();

        let delegate = delegate
            .as_deref_mut()
            .ok_or(TpmRc::AUTHORIZATION_FAILED)?;
        // A failed local check overrides the device's success code: a
        // session mismatch must never be reported as success.
        if !delegate.check_response_authorization(&response_hash, &authorization) {
            return Err(TpmRc::AUTHORIZATION_FAILED);
        }
        Ok(DecodedResponse {
            handles,
            parameters,
            has_sessions: true,
        })
    } else {
        Ok(DecodedResponse {
            handles,
            parameters: buf.get_remaining(),
            has_sessions: false,
        })
    }
}

/// Re-parses the first output parameter after running it through the
/// delegate's decryptor. `mark` is the buffer position where the first
/// parameter started.
fn decrypt_first_parameter<P: Unmarshal>(
    decoded: &DecodedResponse,
    buf: &ResponseBuffer,
    mark: usize,
    delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<P> {
    let delegate = delegate.ok_or(TpmRc::AUTHORIZATION_FAILED)?;
    let mut first = decoded.parameters[mark..buf.position()].to_vec();
    decrypt_parameter(delegate, &mut first)?;
    P::from_bytes(&first)
}

// ==================== Command builders and response parsers ====================

pub fn serialize_command_startup(
    startup_type: TpmSu,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut startup_type_bytes = CommandBuffer::new();
    startup_type_bytes.put_u16(startup_type.to_u16());
    assemble_command(
        TpmCc::Startup,
        &[],
        &[],
        &[startup_type_bytes.as_bytes()],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_startup(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::Startup, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_shutdown(
    shutdown_type: TpmSu,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut shutdown_type_bytes = CommandBuffer::new();
    shutdown_type_bytes.put_u16(shutdown_type.to_u16());
    assemble_command(
        TpmCc::Shutdown,
        &[],
        &[],
        &[shutdown_type_bytes.as_bytes()],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_shutdown(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::Shutdown, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_self_test(
    full_test: u8,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::SelfTest,
        &[],
        &[],
        &[&[full_test]],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_self_test(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::SelfTest, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_get_test_result(
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::GetTestResult,
        &[],
        &[],
        &[],
        false,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_get_test_result(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(Tpm2bMaxBuffer, TpmRc)> {
    let decoded = decode_response(
        TpmCc::GetTestResult,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut out_data = Tpm2bMaxBuffer::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        out_data = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let test_result = TpmRc(buf.get_u32()?);
    Ok((out_data, test_result))
}

pub fn serialize_command_get_random(
    bytes_requested: u16,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut bytes_requested_bytes = CommandBuffer::new();
    bytes_requested_bytes.put_u16(bytes_requested);
    assemble_command(
        TpmCc::GetRandom,
        &[],
        &[],
        &[bytes_requested_bytes.as_bytes()],
        false,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_get_random(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Tpm2bDigest> {
    let decoded = decode_response(
        TpmCc::GetRandom,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut random_bytes = Tpm2bDigest::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        random_bytes = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    Ok(random_bytes)
}

pub fn serialize_command_stir_random(
    in_data: &Tpm2bSensitiveData,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut in_data_bytes = in_data.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut in_data_bytes)?;
    }
    assemble_command(
        TpmCc::StirRandom,
        &[],
        &[],
        &[&in_data_bytes],
        true,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_stir_random(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::StirRandom, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_get_capability(
    capability: TpmCap,
    property: u32,
    property_count: u32,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut parameter_bytes = CommandBuffer::new();
    parameter_bytes.put_u32(capability.to_u32());
    parameter_bytes.put_u32(property);
    parameter_bytes.put_u32(property_count);
    assemble_command(
        TpmCc::GetCapability,
        &[],
        &[],
        &[parameter_bytes.as_bytes()],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_get_capability(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(u8, TpmsCapabilityData)> {
    let decoded = decode_response(TpmCc::GetCapability, response, authorization_delegate)?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let more_data = buf.get_u8()?;
    let capability_data = TpmsCapabilityData::unmarshal(&mut buf)?;
    Ok((more_data, capability_data))
}

pub fn serialize_command_pcr_read(
    pcr_selection_in: &TpmlPcrSelection,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let pcr_selection_bytes = pcr_selection_in.to_bytes()?;
    assemble_command(
        TpmCc::PcrRead,
        &[],
        &[],
        &[&pcr_selection_bytes],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_pcr_read(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(u32, TpmlPcrSelection, TpmlDigest)> {
    let decoded = decode_response(TpmCc::PcrRead, response, authorization_delegate)?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let pcr_update_counter = buf.get_u32()?;
    let pcr_selection_out = TpmlPcrSelection::unmarshal(&mut buf)?;
    let pcr_values = TpmlDigest::unmarshal(&mut buf)?;
    Ok((pcr_update_counter, pcr_selection_out, pcr_values))
}

pub fn serialize_command_pcr_extend(
    pcr_handle: TpmHandle,
    pcr_handle_name: &[u8],
    digests: &TpmlDigestValues,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let digests_bytes = digests.to_bytes()?;
    assemble_command(
        TpmCc::PcrExtend,
        &[pcr_handle],
        &[pcr_handle_name],
        &[&digests_bytes],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_pcr_extend(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::PcrExtend, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_pcr_reset(
    pcr_handle: TpmHandle,
    pcr_handle_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::PcrReset,
        &[pcr_handle],
        &[pcr_handle_name],
        &[],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_pcr_reset(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::PcrReset, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_create_primary(
    primary_handle: TpmHandle,
    primary_handle_name: &[u8],
    in_sensitive: &Tpm2bSensitiveCreate,
    in_public: &Tpm2bPublic,
    outside_info: &Tpm2bData,
    creation_pcr: &TpmlPcrSelection,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut in_sensitive_bytes = in_sensitive.to_bytes()?;
    let in_public_bytes = in_public.to_bytes()?;
    let outside_info_bytes = outside_info.to_bytes()?;
    let creation_pcr_bytes = creation_pcr.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut in_sensitive_bytes)?;
    }
    assemble_command(
        TpmCc::CreatePrimary,
        &[primary_handle],
        &[primary_handle_name],
        &[
            &in_sensitive_bytes,
            &in_public_bytes,
            &outside_info_bytes,
            &creation_pcr_bytes,
        ],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_create_primary(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(
    TpmHandle,
    Tpm2bPublic,
    Tpm2bCreationData,
    Tpm2bDigest,
    TpmtTkCreation,
    Tpm2bName,
)> {
    let decoded = decode_response(
        TpmCc::CreatePrimary,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let object_handle = decoded.handles[0];
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut out_public = Tpm2bPublic::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        out_public = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let creation_data = Tpm2bCreationData::unmarshal(&mut buf)?;
    let creation_hash = Tpm2bDigest::unmarshal(&mut buf)?;
    let creation_ticket = TpmtTkCreation::unmarshal(&mut buf)?;
    let name = Tpm2bName::unmarshal(&mut buf)?;
    Ok((
        object_handle,
        out_public,
        creation_data,
        creation_hash,
        creation_ticket,
        name,
    ))
}

pub fn serialize_command_create(
    parent_handle: TpmHandle,
    parent_handle_name: &[u8],
    in_sensitive: &Tpm2bSensitiveCreate,
    in_public: &Tpm2bPublic,
    outside_info: &Tpm2bData,
    creation_pcr: &TpmlPcrSelection,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut in_sensitive_bytes = in_sensitive.to_bytes()?;
    let in_public_bytes = in_public.to_bytes()?;
    let outside_info_bytes = outside_info.to_bytes()?;
    let creation_pcr_bytes = creation_pcr.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut in_sensitive_bytes)?;
    }
    assemble_command(
        TpmCc::Create,
        &[parent_handle],
        &[parent_handle_name],
        &[
            &in_sensitive_bytes,
            &in_public_bytes,
            &outside_info_bytes,
            &creation_pcr_bytes,
        ],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_create(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(
    Tpm2bPrivate,
    Tpm2bPublic,
    Tpm2bCreationData,
    Tpm2bDigest,
    TpmtTkCreation,
)> {
    let decoded = decode_response(
        TpmCc::Create,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut out_private = Tpm2bPrivate::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        out_private = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let out_public = Tpm2bPublic::unmarshal(&mut buf)?;
    let creation_data = Tpm2bCreationData::unmarshal(&mut buf)?;
    let creation_hash = Tpm2bDigest::unmarshal(&mut buf)?;
    let creation_ticket = TpmtTkCreation::unmarshal(&mut buf)?;
    Ok((
        out_private,
        out_public,
        creation_data,
        creation_hash,
        creation_ticket,
    ))
}

pub fn serialize_command_load(
    parent_handle: TpmHandle,
    parent_handle_name: &[u8],
    in_private: &Tpm2bPrivate,
    in_public: &Tpm2bPublic,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut in_private_bytes = in_private.to_bytes()?;
    let in_public_bytes = in_public.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut in_private_bytes)?;
    }
    assemble_command(
        TpmCc::Load,
        &[parent_handle],
        &[parent_handle_name],
        &[&in_private_bytes, &in_public_bytes],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_load(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(TpmHandle, Tpm2bName)> {
    let decoded = decode_response(TpmCc::Load, response, authorization_delegate.as_deref_mut())?;
    let object_handle = decoded.handles[0];
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut name = Tpm2bName::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        name = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    Ok((object_handle, name))
}

pub fn serialize_command_read_public(
    object_handle: TpmHandle,
    object_handle_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::ReadPublic,
        &[object_handle],
        &[object_handle_name],
        &[],
        false,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_read_public(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(Tpm2bPublic, Tpm2bName, Tpm2bName)> {
    let decoded = decode_response(
        TpmCc::ReadPublic,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut out_public = Tpm2bPublic::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        out_public = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let name = Tpm2bName::unmarshal(&mut buf)?;
    let qualified_name = Tpm2bName::unmarshal(&mut buf)?;
    Ok((out_public, name, qualified_name))
}

pub fn serialize_command_unseal(
    item_handle: TpmHandle,
    item_handle_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::Unseal,
        &[item_handle],
        &[item_handle_name],
        &[],
        false,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_unseal(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Tpm2bSensitiveData> {
    let decoded = decode_response(
        TpmCc::Unseal,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut out_data = Tpm2bSensitiveData::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        out_data = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    Ok(out_data)
}

pub fn serialize_command_object_change_auth(
    object_handle: TpmHandle,
    object_handle_name: &[u8],
    parent_handle: TpmHandle,
    parent_handle_name: &[u8],
    new_auth: &Tpm2bAuth,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut new_auth_bytes = new_auth.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut new_auth_bytes)?;
    }
    assemble_command(
        TpmCc::ObjectChangeAuth,
        &[object_handle, parent_handle],
        &[object_handle_name, parent_handle_name],
        &[&new_auth_bytes],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_object_change_auth(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Tpm2bPrivate> {
    let decoded = decode_response(
        TpmCc::ObjectChangeAuth,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut out_private = Tpm2bPrivate::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        out_private = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    Ok(out_private)
}

pub fn serialize_command_certify(
    object_handle: TpmHandle,
    object_handle_name: &[u8],
    sign_handle: TpmHandle,
    sign_handle_name: &[u8],
    qualifying_data: &Tpm2bData,
    in_scheme: &TpmtSigScheme,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut qualifying_data_bytes = qualifying_data.to_bytes()?;
    let in_scheme_bytes = in_scheme.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut qualifying_data_bytes)?;
    }
    assemble_command(
        TpmCc::Certify,
        &[object_handle, sign_handle],
        &[object_handle_name, sign_handle_name],
        &[&qualifying_data_bytes, &in_scheme_bytes],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_certify(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(Tpm2bAttest, TpmtSignature)> {
    let decoded = decode_response(
        TpmCc::Certify,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut certify_info = Tpm2bAttest::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        certify_info = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let signature = TpmtSignature::unmarshal(&mut buf)?;
    Ok((certify_info, signature))
}

pub fn serialize_command_quote(
    sign_handle: TpmHandle,
    sign_handle_name: &[u8],
    qualifying_data: &Tpm2bData,
    in_scheme: &TpmtSigScheme,
    pcr_select: &TpmlPcrSelection,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut qualifying_data_bytes = qualifying_data.to_bytes()?;
    let in_scheme_bytes = in_scheme.to_bytes()?;
    let pcr_select_bytes = pcr_select.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut qualifying_data_bytes)?;
    }
    assemble_command(
        TpmCc::Quote,
        &[sign_handle],
        &[sign_handle_name],
        &[&qualifying_data_bytes, &in_scheme_bytes, &pcr_select_bytes],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_quote(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(Tpm2bAttest, TpmtSignature)> {
    let decoded = decode_response(TpmCc::Quote, response, authorization_delegate.as_deref_mut())?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut quoted = Tpm2bAttest::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        quoted = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let signature = TpmtSignature::unmarshal(&mut buf)?;
    Ok((quoted, signature))
}

pub fn serialize_command_sign(
    key_handle: TpmHandle,
    key_handle_name: &[u8],
    digest: &Tpm2bDigest,
    in_scheme: &TpmtSigScheme,
    validation: &TpmtTkHashcheck,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut digest_bytes = digest.to_bytes()?;
    let in_scheme_bytes = in_scheme.to_bytes()?;
    let validation_bytes = validation.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut digest_bytes)?;
    }
    assemble_command(
        TpmCc::Sign,
        &[key_handle],
        &[key_handle_name],
        &[&digest_bytes, &in_scheme_bytes, &validation_bytes],
        true,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_sign(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<TpmtSignature> {
    let decoded = decode_response(TpmCc::Sign, response, authorization_delegate)?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    TpmtSignature::unmarshal(&mut buf)
}

pub fn serialize_command_verify_signature(
    key_handle: TpmHandle,
    key_handle_name: &[u8],
    digest: &Tpm2bDigest,
    signature: &TpmtSignature,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut digest_bytes = digest.to_bytes()?;
    let signature_bytes = signature.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut digest_bytes)?;
    }
    assemble_command(
        TpmCc::VerifySignature,
        &[key_handle],
        &[key_handle_name],
        &[&digest_bytes, &signature_bytes],
        true,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_verify_signature(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<TpmtTkVerified> {
    let decoded = decode_response(TpmCc::VerifySignature, response, authorization_delegate)?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    TpmtTkVerified::unmarshal(&mut buf)
}

pub fn serialize_command_hash(
    data: &Tpm2bMaxBuffer,
    hash_alg: TpmAlgId,
    hierarchy: TpmHandle,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut data_bytes = data.to_bytes()?;
    let mut trailer = CommandBuffer::new();
    trailer.put_u16(hash_alg.to_u16());
    trailer.put_u32(hierarchy);
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut data_bytes)?;
    }
    assemble_command(
        TpmCc::Hash,
        &[],
        &[],
        &[&data_bytes, trailer.as_bytes()],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_hash(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(Tpm2bDigest, TpmtTkHashcheck)> {
    let decoded = decode_response(TpmCc::Hash, response, authorization_delegate.as_deref_mut())?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut out_hash = Tpm2bDigest::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        out_hash = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let validation = TpmtTkHashcheck::unmarshal(&mut buf)?;
    Ok((out_hash, validation))
}

pub fn serialize_command_start_auth_session(
    tpm_key: TpmHandle,
    tpm_key_name: &[u8],
    bind: TpmHandle,
    bind_name: &[u8],
    nonce_caller: &Tpm2bNonce,
    encrypted_salt: &Tpm2bEncryptedSecret,
    session_type: TpmSe,
    symmetric: &TpmtSymDef,
    auth_hash: TpmAlgId,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut nonce_caller_bytes = nonce_caller.to_bytes()?;
    let encrypted_salt_bytes = encrypted_salt.to_bytes()?;
    let mut trailer = CommandBuffer::new();
    trailer.put_u8(session_type as u8);
    symmetric.marshal(&mut trailer)?;
    trailer.put_u16(auth_hash.to_u16());
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut nonce_caller_bytes)?;
    }
    assemble_command(
        TpmCc::StartAuthSession,
        &[tpm_key, bind],
        &[tpm_key_name, bind_name],
        &[&nonce_caller_bytes, &encrypted_salt_bytes, trailer.as_bytes()],
        true,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_start_auth_session(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(TpmHandle, Tpm2bNonce)> {
    let decoded = decode_response(
        TpmCc::StartAuthSession,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let session_handle = decoded.handles[0];
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut nonce_tpm = Tpm2bNonce::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        nonce_tpm = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    Ok((session_handle, nonce_tpm))
}

pub fn serialize_command_policy_restart(
    session_handle: TpmHandle,
    session_handle_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::PolicyRestart,
        &[session_handle],
        &[session_handle_name],
        &[],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_policy_restart(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::PolicyRestart, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_policy_pcr(
    policy_session: TpmHandle,
    policy_session_name: &[u8],
    pcr_digest: &Tpm2bDigest,
    pcrs: &TpmlPcrSelection,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut pcr_digest_bytes = pcr_digest.to_bytes()?;
    let pcrs_bytes = pcrs.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut pcr_digest_bytes)?;
    }
    assemble_command(
        TpmCc::PolicyPcr,
        &[policy_session],
        &[policy_session_name],
        &[&pcr_digest_bytes, &pcrs_bytes],
        true,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_policy_pcr(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::PolicyPcr, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_policy_get_digest(
    policy_session: TpmHandle,
    policy_session_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::PolicyGetDigest,
        &[policy_session],
        &[policy_session_name],
        &[],
        false,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_policy_get_digest(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Tpm2bDigest> {
    let decoded = decode_response(
        TpmCc::PolicyGetDigest,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut policy_digest = Tpm2bDigest::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        policy_digest = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    Ok(policy_digest)
}

pub fn serialize_command_flush_context(
    flush_handle: TpmHandle,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    // The flushed handle travels in the parameter area: context handles
    // have no name and take no authorization.
    let mut flush_handle_bytes = CommandBuffer::new();
    flush_handle_bytes.put_u32(flush_handle);
    assemble_command(
        TpmCc::FlushContext,
        &[],
        &[],
        &[flush_handle_bytes.as_bytes()],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_flush_context(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::FlushContext, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_context_save(
    save_handle: TpmHandle,
    save_handle_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::ContextSave,
        &[save_handle],
        &[save_handle_name],
        &[],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_context_save(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<TpmsContext> {
    let decoded = decode_response(TpmCc::ContextSave, response, authorization_delegate)?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    TpmsContext::unmarshal(&mut buf)
}

pub fn serialize_command_context_load(
    context: &TpmsContext,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let context_bytes = context.to_bytes()?;
    assemble_command(
        TpmCc::ContextLoad,
        &[],
        &[],
        &[&context_bytes],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_context_load(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<TpmHandle> {
    let decoded = decode_response(TpmCc::ContextLoad, response, authorization_delegate)?;
    Ok(decoded.handles[0])
}

pub fn serialize_command_evict_control(
    auth: TpmHandle,
    auth_name: &[u8],
    object_handle: TpmHandle,
    object_handle_name: &[u8],
    persistent_handle: TpmHandle,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut persistent_handle_bytes = CommandBuffer::new();
    persistent_handle_bytes.put_u32(persistent_handle);
    assemble_command(
        TpmCc::EvictControl,
        &[auth, object_handle],
        &[auth_name, object_handle_name],
        &[persistent_handle_bytes.as_bytes()],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_evict_control(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::EvictControl, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_clear(
    auth_handle: TpmHandle,
    auth_handle_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::Clear,
        &[auth_handle],
        &[auth_handle_name],
        &[],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_clear(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::Clear, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_clear_control(
    auth: TpmHandle,
    auth_name: &[u8],
    disable: u8,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::ClearControl,
        &[auth],
        &[auth_name],
        &[&[disable]],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_clear_control(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::ClearControl, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_hierarchy_change_auth(
    auth_handle: TpmHandle,
    auth_handle_name: &[u8],
    new_auth: &Tpm2bAuth,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut new_auth_bytes = new_auth.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut new_auth_bytes)?;
    }
    assemble_command(
        TpmCc::HierarchyChangeAuth,
        &[auth_handle],
        &[auth_handle_name],
        &[&new_auth_bytes],
        true,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_hierarchy_change_auth(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::HierarchyChangeAuth, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_dictionary_attack_lock_reset(
    lock_handle: TpmHandle,
    lock_handle_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::DictionaryAttackLockReset,
        &[lock_handle],
        &[lock_handle_name],
        &[],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_dictionary_attack_lock_reset(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(
        TpmCc::DictionaryAttackLockReset,
        response,
        authorization_delegate,
    )?;
    Ok(())
}

pub fn serialize_command_nv_define_space(
    auth_handle: TpmHandle,
    auth_handle_name: &[u8],
    auth: &Tpm2bAuth,
    public_info: &Tpm2bNvPublic,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut auth_bytes = auth.to_bytes()?;
    let public_info_bytes = public_info.to_bytes()?;
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut auth_bytes)?;
    }
    assemble_command(
        TpmCc::NvDefineSpace,
        &[auth_handle],
        &[auth_handle_name],
        &[&auth_bytes, &public_info_bytes],
        true,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_nv_define_space(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::NvDefineSpace, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_nv_undefine_space(
    auth_handle: TpmHandle,
    auth_handle_name: &[u8],
    nv_index: TpmHandle,
    nv_index_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::NvUndefineSpace,
        &[auth_handle, nv_index],
        &[auth_handle_name, nv_index_name],
        &[],
        false,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_nv_undefine_space(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::NvUndefineSpace, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_nv_read_public(
    nv_index: TpmHandle,
    nv_index_name: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    assemble_command(
        TpmCc::NvReadPublic,
        &[nv_index],
        &[nv_index_name],
        &[],
        false,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_nv_read_public(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<(Tpm2bNvPublic, Tpm2bName)> {
    let decoded = decode_response(
        TpmCc::NvReadPublic,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut nv_public = Tpm2bNvPublic::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        nv_public = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    let nv_name = Tpm2bName::unmarshal(&mut buf)?;
    Ok((nv_public, nv_name))
}

pub fn serialize_command_nv_write(
    auth_handle: TpmHandle,
    auth_handle_name: &[u8],
    nv_index: TpmHandle,
    nv_index_name: &[u8],
    data: &Tpm2bMaxNvBuffer,
    offset: u16,
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut data_bytes = data.to_bytes()?;
    let mut offset_bytes = CommandBuffer::new();
    offset_bytes.put_u16(offset);
    if let Some(delegate) = authorization_delegate.as_deref_mut() {
        encrypt_parameter(delegate, &mut data_bytes)?;
    }
    assemble_command(
        TpmCc::NvWrite,
        &[auth_handle, nv_index],
        &[auth_handle_name, nv_index_name],
        &[&data_bytes, offset_bytes.as_bytes()],
        true,
        false,
        authorization_delegate,
    )
}

pub fn parse_response_nv_write(
    response: &[u8],
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<()> {
    decode_response(TpmCc::NvWrite, response, authorization_delegate)?;
    Ok(())
}

pub fn serialize_command_nv_read(
    auth_handle: TpmHandle,
    auth_handle_name: &[u8],
    nv_index: TpmHandle,
    nv_index_name: &[u8],
    size: u16,
    offset: u16,
    authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Vec<u8>> {
    let mut parameter_bytes = CommandBuffer::new();
    parameter_bytes.put_u16(size);
    parameter_bytes.put_u16(offset);
    assemble_command(
        TpmCc::NvRead,
        &[auth_handle, nv_index],
        &[auth_handle_name, nv_index_name],
        &[parameter_bytes.as_bytes()],
        false,
        true,
        authorization_delegate,
    )
}

pub fn parse_response_nv_read(
    response: &[u8],
    mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
) -> TpmResult<Tpm2bMaxNvBuffer> {
    let decoded = decode_response(
        TpmCc::NvRead,
        response,
        authorization_delegate.as_deref_mut(),
    )?;
    let mut buf = ResponseBuffer::new(&decoded.parameters);
    let mark = buf.position();
    let mut data = Tpm2bMaxNvBuffer::unmarshal(&mut buf)?;
    if decoded.has_sessions {
        data = decrypt_first_parameter(&decoded, &buf, mark, authorization_delegate)?;
    }
    Ok(data)
}

// ==================== Completion callback types ====================

pub type StartupResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type ShutdownResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type SelfTestResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type GetTestResultResponse<'a> = Box<dyn FnOnce(TpmResult<(Tpm2bMaxBuffer, TpmRc)>) + 'a>;
pub type GetRandomResponse<'a> = Box<dyn FnOnce(TpmResult<Tpm2bDigest>) + 'a>;
pub type StirRandomResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type GetCapabilityResponse<'a> = Box<dyn FnOnce(TpmResult<(u8, TpmsCapabilityData)>) + 'a>;
pub type PcrReadResponse<'a> =
    Box<dyn FnOnce(TpmResult<(u32, TpmlPcrSelection, TpmlDigest)>) + 'a>;
pub type PcrExtendResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type PcrResetResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type CreatePrimaryResponse<'a> = Box<
    dyn FnOnce(
            TpmResult<(
                TpmHandle,
                Tpm2bPublic,
                Tpm2bCreationData,
                Tpm2bDigest,
                TpmtTkCreation,
                Tpm2bName,
            )>,
        ) + 'a,
>;
pub type CreateResponse<'a> = Box<
    dyn FnOnce(
            TpmResult<(
                Tpm2bPrivate,
                Tpm2bPublic,
                Tpm2bCreationData,
                Tpm2bDigest,
                TpmtTkCreation,
            )>,
        ) + 'a,
>;
pub type LoadResponse<'a> = Box<dyn FnOnce(TpmResult<(TpmHandle, Tpm2bName)>) + 'a>;
pub type ReadPublicResponse<'a> =
    Box<dyn FnOnce(TpmResult<(Tpm2bPublic, Tpm2bName, Tpm2bName)>) + 'a>;
pub type UnsealResponse<'a> = Box<dyn FnOnce(TpmResult<Tpm2bSensitiveData>) + 'a>;
pub type ObjectChangeAuthResponse<'a> = Box<dyn FnOnce(TpmResult<Tpm2bPrivate>) + 'a>;
pub type CertifyResponse<'a> = Box<dyn FnOnce(TpmResult<(Tpm2bAttest, TpmtSignature)>) + 'a>;
pub type QuoteResponse<'a> = Box<dyn FnOnce(TpmResult<(Tpm2bAttest, TpmtSignature)>) + 'a>;
pub type SignResponse<'a> = Box<dyn FnOnce(TpmResult<TpmtSignature>) + 'a>;
pub type VerifySignatureResponse<'a> = Box<dyn FnOnce(TpmResult<TpmtTkVerified>) + 'a>;
pub type HashResponse<'a> = Box<dyn FnOnce(TpmResult<(Tpm2bDigest, TpmtTkHashcheck)>) + 'a>;
pub type StartAuthSessionResponse<'a> =
    Box<dyn FnOnce(TpmResult<(TpmHandle, Tpm2bNonce)>) + 'a>;
pub type PolicyRestartResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type PolicyPcrResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type PolicyGetDigestResponse<'a> = Box<dyn FnOnce(TpmResult<Tpm2bDigest>) + 'a>;
pub type FlushContextResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type ContextSaveResponse<'a> = Box<dyn FnOnce(TpmResult<TpmsContext>) + 'a>;
pub type ContextLoadResponse<'a> = Box<dyn FnOnce(TpmResult<TpmHandle>) + 'a>;
pub type EvictControlResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type ClearResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type ClearControlResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type HierarchyChangeAuthResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type DictionaryAttackLockResetResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type NvDefineSpaceResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type NvUndefineSpaceResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type NvReadPublicResponse<'a> = Box<dyn FnOnce(TpmResult<(Tpm2bNvPublic, Tpm2bName)>) + 'a>;
pub type NvWriteResponse<'a> = Box<dyn FnOnce(TpmResult<()>) + 'a>;
pub type NvReadResponse<'a> = Box<dyn FnOnce(TpmResult<Tpm2bMaxNvBuffer>) + 'a>;

// ==================== The Tpm facade ====================

/// Typed front end over a `CommandTransceiver`. Holds no per-command
/// state; the delegate and the transceiver carry everything mutable.
pub struct Tpm<T: CommandTransceiver> {
    transceiver: T,
}

macro_rules! sync_and_async {
    (
        $(#[$attr:meta])*
        $name:ident / $sync_name:ident ( $($arg:ident : $ty:ty),* )
            -> $out:ty, $serialize:ident, $parse:ident, $callback:ident
    ) => {
        $(#[$attr])*
        pub fn $sync_name(
            &mut self,
            $($arg: $ty,)*
            mut authorization_delegate: Option<&mut (dyn AuthorizationDelegate + '_)>,
        ) -> TpmResult<$out> {
            let command = $serialize($($arg,)* authorization_delegate.as_deref_mut());
            self.run_sync(command, move |response| {
                $parse(response, authorization_delegate)
            })
        }

        $(#[$attr])*
        pub fn $name<'a>(
            &mut self,
            $($arg: $ty,)*
            mut authorization_delegate: Option<&'a mut dyn AuthorizationDelegate>,
            callback: $callback<'a>,
        ) {
            let command = $serialize($($arg,)* authorization_delegate.as_deref_mut());
            self.run_async(
                command,
                move |response| $parse(response, authorization_delegate),
                callback,
            );
        }
    };
}

impl<T: CommandTransceiver> Tpm<T> {
    pub fn new(transceiver: T) -> Self {
        Self { transceiver }
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    pub fn into_transceiver(self) -> T {
        self.transceiver
    }

    fn run_sync<R>(
        &mut self,
        command: TpmResult<Vec<u8>>,
        parse: impl FnOnce(&[u8]) -> TpmResult<R>,
    ) -> TpmResult<R> {
        let command = command?;
        let response = self.transceiver.send_command_and_wait(&command);
        parse(&response)
    }

    fn run_async<'a, R>(
        &mut self,
        command: TpmResult<Vec<u8>>,
        parse: impl FnOnce(&[u8]) -> TpmResult<R> + 'a,
        callback: Box<dyn FnOnce(TpmResult<R>) + 'a>,
    ) {
        match command {
            Ok(command) => self.transceiver.send_command(
                &command,
                Box::new(move |response: Vec<u8>| callback(parse(&response))),
            ),
            Err(rc) => callback(Err(rc)),
        }
    }

    sync_and_async!(
        startup / startup_sync(startup_type: TpmSu) -> (),
        serialize_command_startup, parse_response_startup, StartupResponse
    );
    sync_and_async!(
        shutdown / shutdown_sync(shutdown_type: TpmSu) -> (),
        serialize_command_shutdown, parse_response_shutdown, ShutdownResponse
    );
    sync_and_async!(
        self_test / self_test_sync(full_test: u8) -> (),
        serialize_command_self_test, parse_response_self_test, SelfTestResponse
    );
    sync_and_async!(
        get_test_result / get_test_result_sync() -> (Tpm2bMaxBuffer, TpmRc),
        serialize_command_get_test_result, parse_response_get_test_result, GetTestResultResponse
    );
    sync_and_async!(
        get_random / get_random_sync(bytes_requested: u16) -> Tpm2bDigest,
        serialize_command_get_random, parse_response_get_random, GetRandomResponse
    );
    sync_and_async!(
        stir_random / stir_random_sync(in_data: &Tpm2bSensitiveData) -> (),
        serialize_command_stir_random, parse_response_stir_random, StirRandomResponse
    );
    sync_and_async!(
        get_capability / get_capability_sync(
            capability: TpmCap, property: u32, property_count: u32
        ) -> (u8, TpmsCapabilityData),
        serialize_command_get_capability, parse_response_get_capability, GetCapabilityResponse
    );
    sync_and_async!(
        pcr_read / pcr_read_sync(pcr_selection_in: &TpmlPcrSelection)
            -> (u32, TpmlPcrSelection, TpmlDigest),
        serialize_command_pcr_read, parse_response_pcr_read, PcrReadResponse
    );
    sync_and_async!(
        pcr_extend / pcr_extend_sync(
            pcr_handle: TpmHandle, pcr_handle_name: &[u8], digests: &TpmlDigestValues
        ) -> (),
        serialize_command_pcr_extend, parse_response_pcr_extend, PcrExtendResponse
    );
    sync_and_async!(
        pcr_reset / pcr_reset_sync(pcr_handle: TpmHandle, pcr_handle_name: &[u8]) -> (),
        serialize_command_pcr_reset, parse_response_pcr_reset, PcrResetResponse
    );
    sync_and_async!(
        create_primary / create_primary_sync(
            primary_handle: TpmHandle, primary_handle_name: &[u8],
            in_sensitive: &Tpm2bSensitiveCreate, in_public: &Tpm2bPublic,
            outside_info: &Tpm2bData, creation_pcr: &TpmlPcrSelection
        ) -> (TpmHandle, Tpm2bPublic, Tpm2bCreationData, Tpm2bDigest, TpmtTkCreation, Tpm2bName),
        serialize_command_create_primary, parse_response_create_primary, CreatePrimaryResponse
    );
    sync_and_async!(
        create / create_sync(
            parent_handle: TpmHandle, parent_handle_name: &[u8],
            in_sensitive: &Tpm2bSensitiveCreate, in_public: &Tpm2bPublic,
            outside_info: &Tpm2bData, creation_pcr: &TpmlPcrSelection
        ) -> (Tpm2bPrivate, Tpm2bPublic, Tpm2bCreationData, Tpm2bDigest, TpmtTkCreation),
        serialize_command_create, parse_response_create, CreateResponse
    );
    sync_and_async!(
        load / load_sync(
            parent_handle: TpmHandle, parent_handle_name: &[u8],
            in_private: &Tpm2bPrivate, in_public: &Tpm2bPublic
        ) -> (TpmHandle, Tpm2bName),
        serialize_command_load, parse_response_load, LoadResponse
    );
    sync_and_async!(
        read_public / read_public_sync(object_handle: TpmHandle, object_handle_name: &[u8])
            -> (Tpm2bPublic, Tpm2bName, Tpm2bName),
        serialize_command_read_public, parse_response_read_public, ReadPublicResponse
    );
    sync_and_async!(
        unseal / unseal_sync(item_handle: TpmHandle, item_handle_name: &[u8])
            -> Tpm2bSensitiveData,
        serialize_command_unseal, parse_response_unseal, UnsealResponse
    );
    sync_and_async!(
        object_change_auth / object_change_auth_sync(
            object_handle: TpmHandle, object_handle_name: &[u8],
            parent_handle: TpmHandle, parent_handle_name: &[u8], new_auth: &Tpm2bAuth
        ) -> Tpm2bPrivate,
        serialize_command_object_change_auth, parse_response_object_change_auth,
        ObjectChangeAuthResponse
    );
    sync_and_async!(
        certify / certify_sync(
            object_handle: TpmHandle, object_handle_name: &[u8],
            sign_handle: TpmHandle, sign_handle_name: &[u8],
            qualifying_data: &Tpm2bData, in_scheme: &TpmtSigScheme
        ) -> (Tpm2bAttest, TpmtSignature),
        serialize_command_certify, parse_response_certify, CertifyResponse
    );
    sync_and_async!(
        quote / quote_sync(
            sign_handle: TpmHandle, sign_handle_name: &[u8],
            qualifying_data: &Tpm2bData, in_scheme: &TpmtSigScheme,
            pcr_select: &TpmlPcrSelection
        ) -> (Tpm2bAttest, TpmtSignature),
        serialize_command_quote, parse_response_quote, QuoteResponse
    );
    sync_and_async!(
        sign / sign_sync(
            key_handle: TpmHandle, key_handle_name: &[u8], digest: &Tpm2bDigest,
            in_scheme: &TpmtSigScheme, validation: &TpmtTkHashcheck
        ) -> TpmtSignature,
        serialize_command_sign, parse_response_sign, SignResponse
    );
    sync_and_async!(
        verify_signature / verify_signature_sync(
            key_handle: TpmHandle, key_handle_name: &[u8],
            digest: &Tpm2bDigest, signature: &TpmtSignature
        ) -> TpmtTkVerified,
        serialize_command_verify_signature, parse_response_verify_signature,
        VerifySignatureResponse
    );
    sync_and_async!(
        hash / hash_sync(data: &Tpm2bMaxBuffer, hash_alg: TpmAlgId, hierarchy: TpmHandle)
            -> (Tpm2bDigest, TpmtTkHashcheck),
        serialize_command_hash, parse_response_hash, HashResponse
    );
    sync_and_async!(
        start_auth_session / start_auth_session_sync(
            tpm_key: TpmHandle, tpm_key_name: &[u8], bind: TpmHandle, bind_name: &[u8],
            nonce_caller: &Tpm2bNonce, encrypted_salt: &Tpm2bEncryptedSecret,
            session_type: TpmSe, symmetric: &TpmtSymDef, auth_hash: TpmAlgId
        ) -> (TpmHandle, Tpm2bNonce),
        serialize_command_start_auth_session, parse_response_start_auth_session,
        StartAuthSessionResponse
    );
    sync_and_async!(
        policy_restart / policy_restart_sync(
            session_handle: TpmHandle, session_handle_name: &[u8]
        ) -> (),
        serialize_command_policy_restart, parse_response_policy_restart, PolicyRestartResponse
    );
    sync_and_async!(
        policy_pcr / policy_pcr_sync(
            policy_session: TpmHandle, policy_session_name: &[u8],
            pcr_digest: &Tpm2bDigest, pcrs: &TpmlPcrSelection
        ) -> (),
        serialize_command_policy_pcr, parse_response_policy_pcr, PolicyPcrResponse
    );
    sync_and_async!(
        policy_get_digest / policy_get_digest_sync(
            policy_session: TpmHandle, policy_session_name: &[u8]
        ) -> Tpm2bDigest,
        serialize_command_policy_get_digest, parse_response_policy_get_digest,
        PolicyGetDigestResponse
    );
    sync_and_async!(
        flush_context / flush_context_sync(flush_handle: TpmHandle) -> (),
        serialize_command_flush_context, parse_response_flush_context, FlushContextResponse
    );
    sync_and_async!(
        context_save / context_save_sync(save_handle: TpmHandle, save_handle_name: &[u8])
            -> TpmsContext,
        serialize_command_context_save, parse_response_context_save, ContextSaveResponse
    );
    sync_and_async!(
        context_load / context_load_sync(context: &TpmsContext) -> TpmHandle,
        serialize_command_context_load, parse_response_context_load, ContextLoadResponse
    );
    sync_and_async!(
        evict_control / evict_control_sync(
            auth: TpmHandle, auth_name: &[u8],
            object_handle: TpmHandle, object_handle_name: &[u8], persistent_handle: TpmHandle
        ) -> (),
        serialize_command_evict_control, parse_response_evict_control, EvictControlResponse
    );
    sync_and_async!(
        clear / clear_sync(auth_handle: TpmHandle, auth_handle_name: &[u8]) -> (),
        serialize_command_clear, parse_response_clear, ClearResponse
    );
    sync_and_async!(
        clear_control / clear_control_sync(auth: TpmHandle, auth_name: &[u8], disable: u8) -> (),
        serialize_command_clear_control, parse_response_clear_control, ClearControlResponse
    );
    sync_and_async!(
        hierarchy_change_auth / hierarchy_change_auth_sync(
            auth_handle: TpmHandle, auth_handle_name: &[u8], new_auth: &Tpm2bAuth
        ) -> (),
        serialize_command_hierarchy_change_auth, parse_response_hierarchy_change_auth,
        HierarchyChangeAuthResponse
    );
    sync_and_async!(
        dictionary_attack_lock_reset / dictionary_attack_lock_reset_sync(
            lock_handle: TpmHandle, lock_handle_name: &[u8]
        ) -> (),
        serialize_command_dictionary_attack_lock_reset,
        parse_response_dictionary_attack_lock_reset, DictionaryAttackLockResetResponse
    );
    sync_and_async!(
        nv_define_space / nv_define_space_sync(
            auth_handle: TpmHandle, auth_handle_name: &[u8],
            auth: &Tpm2bAuth, public_info: &Tpm2bNvPublic
        ) -> (),
        serialize_command_nv_define_space, parse_response_nv_define_space, NvDefineSpaceResponse
    );
    sync_and_async!(
        nv_undefine_space / nv_undefine_space_sync(
            auth_handle: TpmHandle, auth_handle_name: &[u8],
            nv_index: TpmHandle, nv_index_name: &[u8]
        ) -> (),
        serialize_command_nv_undefine_space, parse_response_nv_undefine_space,
        NvUndefineSpaceResponse
    );
    sync_and_async!(
        nv_read_public / nv_read_public_sync(nv_index: TpmHandle, nv_index_name: &[u8])
            -> (Tpm2bNvPublic, Tpm2bName),
        serialize_command_nv_read_public, parse_response_nv_read_public, NvReadPublicResponse
    );
    sync_and_async!(
        nv_write / nv_write_sync(
            auth_handle: TpmHandle, auth_handle_name: &[u8],
            nv_index: TpmHandle, nv_index_name: &[u8], data: &Tpm2bMaxNvBuffer, offset: u16
        ) -> (),
        serialize_command_nv_write, parse_response_nv_write, NvWriteResponse
    );
    sync_and_async!(
        nv_read / nv_read_sync(
            auth_handle: TpmHandle, auth_handle_name: &[u8],
            nv_index: TpmHandle, nv_index_name: &[u8], size: u16, offset: u16
        ) -> Tpm2bMaxNvBuffer,
        serialize_command_nv_read, parse_response_nv_read, NvReadResponse
    );
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::super::transceiver::ResponseCallback;
    use super::*;

    struct FakeTransceiver {
        expected_command: Vec<u8>,
        response: Vec<u8>,
    }

    impl CommandTransceiver for FakeTransceiver {
        fn send_command_and_wait(&mut self, command: &[u8]) -> Vec<u8> {
            assert_eq!(
                hex::encode(command),
                hex::encode(&self.expected_command),
                "unexpected command bytes"
            );
            self.response.clone()
        }

        fn send_command<'a>(&mut self, command: &[u8], callback: ResponseCallback<'a>) {
            let response = self.send_command_and_wait(command);
            callback(response);
        }
    }

    #[derive(Default)]
    struct FakeDelegate {
        auth_in: Vec<u8>,
        expected_auth_out: Vec<u8>,
        check_result: bool,
        // (expected input, replacement output) for the parameter hooks
        encrypt: Option<(Vec<u8>, Vec<u8>)>,
        decrypt: Option<(Vec<u8>, Vec<u8>)>,
        auth_calls: usize,
        check_calls: usize,
        encrypt_calls: usize,
        decrypt_calls: usize,
    }

    impl FakeDelegate {
        fn passthrough() -> Self {
            Self {
                check_result: true,
                ..Default::default()
            }
        }
    }

    impl AuthorizationDelegate for FakeDelegate {
        fn get_command_authorization(
            &mut self,
            command_hash: &[u8],
            _enc: bool,
            _dec: bool,
        ) -> Option<Vec<u8>> {
            assert_eq!(command_hash.len(), 32);
            self.auth_calls += 1;
            Some(self.auth_in.clone())
        }

        fn check_response_authorization(
            &mut self,
            response_hash: &[u8],
            authorization: &[u8],
        ) -> bool {
            assert_eq!(response_hash.len(), 32);
            assert_eq!(authorization, self.expected_auth_out.as_slice());
            self.check_calls += 1;
            self.check_result
        }

        fn encrypt_command_parameter(&mut self, parameter: &mut Vec<u8>) -> bool {
            self.encrypt_calls += 1;
            if let Some((expected, output)) = &self.encrypt {
                assert_eq!(parameter, expected);
                *parameter = output.clone();
            }
            true
        }

        fn decrypt_response_parameter(&mut self, parameter: &mut Vec<u8>) -> bool {
            self.decrypt_calls += 1;
            if let Some((expected, output)) = &self.decrypt {
                assert_eq!(parameter, expected);
                *parameter = output.clone();
            }
            true
        }

        fn get_tpm_nonce(&mut self) -> Option<Vec<u8>> {
            None
        }
    }

    const STARTUP_COMMAND: [u8; 12] = [
        0x80, 0x01, // TPM_ST_NO_SESSIONS
        0x00, 0x00, 0x00, 0x0C, // size = 12
        0x00, 0x00, 0x01, 0x44, // TPM_CC_Startup
        0x00, 0x00, // TPM_SU_CLEAR
    ];
    const SUCCESS_RESPONSE: [u8; 10] = [
        0x80, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x00,
    ];
    const FAILURE_RESPONSE: [u8; 10] = [
        0x80, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x01,
    ];

    #[test]
    fn synchronous_startup() {
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command: STARTUP_COMMAND.to_vec(),
            response: SUCCESS_RESPONSE.to_vec(),
        });
        let mut delegate = FakeDelegate::passthrough();
        assert_eq!(tpm.startup_sync(TpmSu::Clear, Some(&mut delegate)), Ok(()));
        assert_eq!(delegate.auth_calls, 1);
    }

    #[test]
    fn synchronous_startup_with_error() {
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command: STARTUP_COMMAND.to_vec(),
            response: FAILURE_RESPONSE.to_vec(),
        });
        let mut delegate = FakeDelegate::passthrough();
        assert_eq!(
            tpm.startup_sync(TpmSu::Clear, Some(&mut delegate)),
            Err(TpmRc::FAILURE)
        );
    }

    #[test]
    fn asynchronous_startup() {
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command: STARTUP_COMMAND.to_vec(),
            response: SUCCESS_RESPONSE.to_vec(),
        });
        let mut delegate = FakeDelegate::passthrough();
        let result = Cell::new(None);
        tpm.startup(
            TpmSu::Clear,
            Some(&mut delegate),
            Box::new(|r| result.set(Some(r))),
        );
        assert_eq!(result.get(), Some(Ok(())));
    }

    #[test]
    fn asynchronous_startup_with_error() {
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command: STARTUP_COMMAND.to_vec(),
            response: FAILURE_RESPONSE.to_vec(),
        });
        let mut delegate = FakeDelegate::passthrough();
        let result = Cell::new(None);
        tpm.startup(
            TpmSu::Clear,
            Some(&mut delegate),
            Box::new(|r| result.set(Some(r))),
        );
        assert_eq!(result.get(), Some(Err(TpmRc::FAILURE)));
    }

    #[test]
    fn error_short_circuits_output_parsing() {
        // Garbage after the response code must never be touched when the
        // device reports an error.
        let response = [
            0x80, 0x01, 0x00, 0x00, 0x00, 0x0E, 0x00, 0x00, 0x01, 0x01, 0xFF, 0xFF, 0xFF, 0xFF,
        ];
        assert_eq!(
            parse_response_get_random(&response, None),
            Err(TpmRc::FAILURE)
        );
    }

    #[test]
    fn response_size_field_must_match_buffer() {
        let mut response = SUCCESS_RESPONSE.to_vec();
        response.push(0x00);
        assert_eq!(parse_response_startup(&response, None), Err(TpmRc::SIZE));
    }

    #[test]
    fn get_random_without_sessions() {
        let expected_command = vec![
            0x80, 0x01, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x01, 0x7B, 0x00, 0x20,
        ];
        let mut response = vec![0x80, 0x01, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00];
        response.extend_from_slice(&[0x00, 0x20]);
        response.extend_from_slice(&[0x5A; 32]);
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command,
            response,
        });
        let random = tpm.get_random_sync(32, None).unwrap();
        assert_eq!(random.buffer, vec![0x5A; 32]);
    }

    #[test]
    fn flush_context_handle_is_a_parameter() {
        let expected_command = vec![
            0x80, 0x01, 0x00, 0x00, 0x00, 0x0E, 0x00, 0x00, 0x01, 0x65, 0x80, 0x00, 0x00, 0x01,
        ];
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command,
            response: SUCCESS_RESPONSE.to_vec(),
        });
        assert_eq!(tpm.flush_context_sync(0x80000001, None), Ok(()));
    }

    #[test]
    fn transport_failure_surfaces_as_error_response() {
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command: STARTUP_COMMAND.to_vec(),
            response: super::super::error::create_error_response(TpmRc::TCTI_NO_RESPONSE),
        });
        assert_eq!(
            tpm.startup_sync(TpmSu::Clear, None),
            Err(TpmRc::TCTI_NO_RESPONSE)
        );
    }

    fn create_primary_fixture() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let auth_in = vec![b'A'; 10];
        let auth_out = vec![b'B'; 10];
        let sensitive = [
            0x00, 0x05, // size
            0x00, 0x01, b'a', // user_auth
            0x00, 0x00, // data
        ];
        let public_data = [
            0x00, 0x12, // size = 18
            0x00, 0x25, // TPM_ALG_SYMCIPHER
            0x00, 0x0B, // SHA256
            0x00, 0x00, 0x00, 0x00, // attributes
            0x00, 0x00, // auth_policy
            0x00, 0x06, // AES
            0x00, 0x80, // 128
            0x00, 0x43, // CFB
            0x00, 0x00, // unique
        ];
        let creation_data = [
            0x00, 0x0F, // size = 15
            0x00, 0x00, 0x00, 0x00, // pcr_select.count = 0
            0x00, 0x00, // pcr_digest
            0x00, // locality
            0x00, 0x00, // parent_name_alg = TPM_ALG_ERROR
            0x00, 0x00, // parent_name
            0x00, 0x00, // parent_qualified_name
            0x00, 0x00, // outside_info
        ];

        let mut command = vec![
            0x80, 0x02, // TPM_ST_SESSIONS
            0x00, 0x00, 0x00, 0x3D, // size = 61
            0x00, 0x00, 0x01, 0x31, // TPM_CC_CreatePrimary
            0x40, 0x00, 0x00, 0x07, // TPM_RH_NULL
            0x00, 0x00, 0x00, 0x0A, // auth size
        ];
        command.extend_from_slice(&auth_in);
        command.extend_from_slice(&sensitive);
        command.extend_from_slice(&public_data);
        command.extend_from_slice(&[0x00, 0x00]); // outside_info
        command.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // creation_pcr

        let mut response = vec![
            0x80, 0x02, // TPM_ST_SESSIONS
            0x00, 0x00, 0x00, 0x51, // size = 81
            0x00, 0x00, 0x00, 0x00, // TPM_RC_SUCCESS
            0x80, 0x00, 0x00, 0x01, // out handle
            0x00, 0x00, 0x00, 0x35, // parameter size = 53
        ];
        response.extend_from_slice(&public_data);
        response.extend_from_slice(&creation_data);
        response.extend_from_slice(&[0x00, 0x01, b'b']); // creation_hash
        response.extend_from_slice(&[0x80, 0x02, 0x40, 0x00, 0x00, 0x07, 0x00, 0x00]); // ticket
        response.extend_from_slice(&[0x00, 0x03, b'K', b'E', b'Y']); // name
        response.extend_from_slice(&auth_out);

        (command, response, auth_out)
    }

    #[test]
    fn synchronous_create_primary_full_flow() {
        let (expected_command, response, auth_out) = create_primary_fixture();
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command,
            response,
        });
        let mut delegate = FakeDelegate {
            auth_in: vec![b'A'; 10],
            expected_auth_out: auth_out,
            check_result: true,
            ..Default::default()
        };

        let in_sensitive = Tpm2bSensitiveCreate::new(TpmsSensitiveCreate {
            user_auth: Tpm2bAuth::new(b"a".to_vec()),
            data: Tpm2bSensitiveData::empty(),
        });
        let in_public = Tpm2bPublic::new(TpmtPublic {
            type_alg: TpmAlgId::SymCipher,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject(0),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmuPublicParms::SymCipher(TpmsSymcipherParms {
                sym: TpmtSymDef::aes_128_cfb(),
            }),
            unique: TpmuPublicId::Sym(Tpm2bDigest::empty()),
        });

        let (handle, out_public, creation_data, creation_hash, creation_ticket, name) = tpm
            .create_primary_sync(
                tpm_rh::NULL,
                &name_from_handle(tpm_rh::NULL),
                &in_sensitive,
                &in_public,
                &Tpm2bData::empty(),
                &TpmlPcrSelection::default(),
                Some(&mut delegate),
            )
            .unwrap();

        assert_eq!(handle, 0x80000001);
        assert_eq!(out_public, in_public);
        let creation_data = creation_data.creation_data.unwrap();
        assert_eq!(creation_data.parent_name_alg, TpmAlgId::Error);
        assert!(creation_data.pcr_select.pcr_selections.is_empty());
        assert_eq!(creation_hash.buffer, b"b");
        assert_eq!(creation_ticket.tag, TpmSt::Sessions);
        assert_eq!(creation_ticket.hierarchy, tpm_rh::NULL);
        assert!(creation_ticket.digest.buffer.is_empty());
        assert_eq!(name.buffer, b"KEY");
        assert_eq!(delegate.auth_calls, 1);
        assert_eq!(delegate.check_calls, 1);
        assert_eq!(delegate.encrypt_calls, 1);
        assert_eq!(delegate.decrypt_calls, 1);
    }

    fn certify_fixture() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let auth_in = vec![b'A'; 10];
        let auth_out = vec![b'B'; 20];

        let mut command = vec![
            0x80, 0x02, // TPM_ST_SESSIONS
            0x00, 0x00, 0x00, 0x30, // size = 48
            0x00, 0x00, 0x01, 0x48, // TPM_CC_Certify
            0x11, 0x22, 0x33, 0x44, // object handle
            0x55, 0x66, 0x77, 0x88, // sign handle
            0x00, 0x00, 0x00, 0x0A, // auth size
        ];
        command.extend_from_slice(&auth_in);
        command.extend_from_slice(&[0x00, 0x0C]); // qualifying_data size
        command.extend_from_slice(b"ct_user_data");
        command.extend_from_slice(&[0x00, 0x10]); // scheme = TPM_ALG_NULL

        let mut response = vec![
            0x80, 0x02, // TPM_ST_SESSIONS
            0x00, 0x00, 0x00, 0x41, // size = 65
            0x00, 0x00, 0x00, 0x00, // TPM_RC_SUCCESS
            0x00, 0x00, 0x00, 0x1F, // parameter size = 31
        ];
        response.extend_from_slice(&[0x00, 0x0E]); // certify_info size
        response.extend_from_slice(b"ct_signed_data");
        response.extend_from_slice(&[0x00, 0x14, 0x00, 0x0B, 0x00, 0x09]); // RSASSA/SHA256 sig
        response.extend_from_slice(b"signature");
        response.extend_from_slice(&auth_out);

        (command, response, auth_out)
    }

    #[test]
    fn full_certify_flow_with_parameter_encryption() {
        let (expected_command, response, auth_out) = certify_fixture();
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command,
            response,
        });
        let mut delegate = FakeDelegate {
            auth_in: vec![b'A'; 10],
            expected_auth_out: auth_out,
            check_result: true,
            encrypt: Some((b"pt_user_data".to_vec(), b"ct_user_data".to_vec())),
            decrypt: Some((b"ct_signed_data".to_vec(), b"pt_signed_data".to_vec())),
            ..Default::default()
        };

        let result = RefCell::new(None);
        tpm.certify(
            0x11223344,
            b"object_handle",
            0x55667788,
            b"sign_handle",
            &Tpm2bData::new(b"pt_user_data".to_vec()),
            &TpmtSigScheme::null(),
            Some(&mut delegate),
            Box::new(|r| {
                result.replace(Some(r));
            }),
        );

        let (certify_info, signature) = result.into_inner().unwrap().unwrap();
        assert_eq!(certify_info.buffer, b"pt_signed_data");
        match signature.signature {
            TpmuSignature::Rsa(body) => assert_eq!(body.sig.buffer, b"signature"),
            other => panic!("unexpected signature body: {other:?}"),
        }
        assert_eq!(delegate.encrypt_calls, 1);
        assert_eq!(delegate.decrypt_calls, 1);
        assert_eq!(delegate.check_calls, 1);
    }

    #[test]
    fn failed_response_authorization_overrides_device_success() {
        let (expected_command, response, auth_out) = certify_fixture();
        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command,
            response,
        });
        let mut delegate = FakeDelegate {
            auth_in: vec![b'A'; 10],
            expected_auth_out: auth_out,
            check_result: false,
            encrypt: Some((b"pt_user_data".to_vec(), b"ct_user_data".to_vec())),
            ..Default::default()
        };

        let result = tpm.certify_sync(
            0x11223344,
            b"object_handle",
            0x55667788,
            b"sign_handle",
            &Tpm2bData::new(b"pt_user_data".to_vec()),
            &TpmtSigScheme::null(),
            Some(&mut delegate),
        );
        assert_eq!(result, Err(TpmRc::AUTHORIZATION_FAILED));
        // Output decryption is never attempted after a failed check.
        assert_eq!(delegate.decrypt_calls, 0);
    }

    #[test]
    fn sessions_response_without_delegate_is_rejected() {
        let (_, response, _) = certify_fixture();
        assert_eq!(
            parse_response_certify(&response, None),
            Err(TpmRc::AUTHORIZATION_FAILED)
        );
    }

    #[test]
    fn empty_authorization_keeps_no_sessions_tag() {
        // The delegate is consulted but returns no authorization bytes,
        // so the command keeps TPM_ST_NO_SESSIONS (the Startup case).
        let mut delegate = FakeDelegate::passthrough();
        let command =
            serialize_command_startup(TpmSu::Clear, Some(&mut delegate)).unwrap();
        assert_eq!(command, STARTUP_COMMAND);
        assert_eq!(delegate.auth_calls, 1);
    }

    #[test]
    fn password_session_command_layout() {
        use super::super::authorization::PasswordAuthorizationDelegate;

        let mut delegate = PasswordAuthorizationDelegate::new(Vec::new());
        let command = serialize_command_pcr_extend(
            23,
            &name_from_handle(23),
            &TpmlDigestValues::single(TpmtHa::sha256(vec![0x42; 32])),
            Some(&mut delegate),
        )
        .unwrap();

        // tag + size + code + handle
        assert_eq!(&command[..2], [0x80, 0x02]);
        assert_eq!(&command[6..10], [0x00, 0x00, 0x01, 0x82]);
        assert_eq!(&command[10..14], [0x00, 0x00, 0x00, 0x17]);
        // 9-byte null-password auth area
        assert_eq!(&command[14..18], [0x00, 0x00, 0x00, 0x09]);
        assert_eq!(
            &command[18..27],
            [0x40, 0x00, 0x00, 0x09, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
        // total size field matches the buffer length
        let size = u32::from_be_bytes([command[2], command[3], command[4], command[5]]);
        assert_eq!(size as usize, command.len());
    }

    #[test]
    fn start_auth_session_returns_response_handle() {
        let mut expected_command = vec![
            0x80, 0x01, 0x00, 0x00, 0x00, 0x2F, 0x00, 0x00, 0x01, 0x76, // header
            0x40, 0x00, 0x00, 0x07, // tpm_key = TPM_RH_NULL
            0x40, 0x00, 0x00, 0x07, // bind = TPM_RH_NULL
            0x00, 0x10, // nonce_caller size
        ];
        expected_command.extend_from_slice(&[0x00; 16]);
        expected_command.extend_from_slice(&[0x00, 0x00]); // encrypted_salt
        expected_command.push(0x01); // TPM_SE_POLICY
        expected_command.extend_from_slice(&[0x00, 0x06, 0x00, 0x80, 0x00, 0x43]); // AES-128-CFB
        expected_command.extend_from_slice(&[0x00, 0x0B]); // SHA256

        let mut response = vec![
            0x80, 0x01, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, // header
            0x02, 0x00, 0x00, 0x00, // session handle
            0x00, 0x10, // nonce_tpm size
        ];
        response.extend_from_slice(&[0xA5; 16]);

        let mut tpm = Tpm::new(FakeTransceiver {
            expected_command,
            response,
        });
        let (handle, nonce_tpm) = tpm
            .start_auth_session_sync(
                tpm_rh::NULL,
                &name_from_handle(tpm_rh::NULL),
                tpm_rh::NULL,
                &name_from_handle(tpm_rh::NULL),
                &Tpm2bNonce::new(vec![0x00; 16]),
                &Tpm2bEncryptedSecret::empty(),
                TpmSe::Policy,
                &TpmtSymDef::aes_128_cfb(),
                TpmAlgId::Sha256,
                None,
            )
            .unwrap();
        assert_eq!(handle, 0x02000000);
        assert_eq!(nonce_tpm.buffer, vec![0xA5; 16]);
    }
}
