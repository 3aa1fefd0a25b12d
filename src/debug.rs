//! Validation layer message callbacks for the debug utils messenger.

use ash::vk;
use std::borrow::Cow;
use std::ffi::CStr;

pub(crate) struct CallbackMessage<'a> {
    pub id_name: Cow<'a, str>,
    pub id_number: i32,
    pub message: Cow<'a, str>,
}

/// Caller must pass the callback data pointer handed to a messenger callback.
pub(crate) unsafe fn read_callback_data<'a>(
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'a>,
) -> Option<CallbackMessage<'a>> {
    if p_callback_data.is_null() {
        return None;
    }

    unsafe {
        let callback_data = *p_callback_data;

        let id_name = if callback_data.p_message_id_name.is_null() {
            Cow::from("")
        } else {
            CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
        };

        let message = if callback_data.p_message.is_null() {
            Cow::from("")
        } else {
            CStr::from_ptr(callback_data.p_message).to_string_lossy()
        };

        Some(CallbackMessage {
            id_name,
            id_number: callback_data.message_id_number,
            message,
        })
    }
}

/// Info and verbose go to stdout, warnings and errors to stderr.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let Some(data) = (unsafe { read_callback_data(p_callback_data) }) else {
        return vk::FALSE;
    };
    let message = data.message;

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            println!("Validation layer info: {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            eprintln!("Validation layer warning: {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            eprintln!("Validation layer error: {message}");
        }
        _ => eprintln!("Validation layer info (unknown severity): {message}"),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_message_fields() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message_id_name: c"VUID-test".as_ptr(),
            message_id_number: 42,
            p_message: c"something happened".as_ptr(),
            ..Default::default()
        };

        let message = unsafe { read_callback_data(&data) }.unwrap();

        assert_eq!(message.id_name, "VUID-test");
        assert_eq!(message.id_number, 42);
        assert_eq!(message.message, "something happened");
    }

    #[test]
    fn null_strings_read_as_empty() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default();

        let message = unsafe { read_callback_data(&data) }.unwrap();

        assert_eq!(message.id_name, "");
        assert_eq!(message.message, "");
        assert!(unsafe { read_callback_data(std::ptr::null()) }.is_none());
    }

    #[test]
    fn callback_never_aborts_the_call() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: c"hello".as_ptr(),
            ..Default::default()
        };

        let result = unsafe {
            vulkan_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };

        assert_eq!(result, vk::FALSE);
    }
}
